//! Shader Declaration Stubs
//!
//! Renders, per stage, the declarations a shader must carry to match a
//! [`ShaderBindings`] layout (defines, uniform structs, vertex inputs,
//! resource bindings and push constants), and checks an existing stub
//! against a layout.
//!
//! Stubs are rendered from `templates/stub.wgsl` with minijinja. The
//! validator does not go through the template: it derives the canonical
//! declaration lines directly from the bindings, so a template that drifts
//! from the binding order is caught by the same check as a stale stub.
//!
//! Canonical grammar (one declaration per line, whitespace-insensitive):
//!
//! | Item          | Line                                                      |
//! |---------------|-----------------------------------------------------------|
//! | define        | `#define NAME [VALUE]`                                    |
//! | uniform block | `struct NAME_t {` / `field: type,` / `};`                 |
//! | vertex input  | `@location(L) var<in> NAME: type;`                        |
//! | binding       | `@group(G) @binding(B) var[<space>] NAME: type;`          |
//! | push constant | `var<push_constant> NAME: NAME_t;`                        |

use std::borrow::Cow;
use std::sync::OnceLock;

use minijinja::{Environment, Error, ErrorKind, syntax::SyntaxConfig};
use rust_embed::RustEmbed;
use serde::Serialize;

use crate::errors::{Result, RhiError};
use crate::rhi::{BufferField, ConstantDesc, SamplerKind, ShaderBindings, ShaderStage};

static STUB_ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(RustEmbed)]
#[folder = "src/binding/templates"]
struct StubTemplates;

const STUB_TEMPLATE: &str = "stub";

fn get_env() -> &'static Environment<'static> {
    STUB_ENV.get_or_init(|| {
        let mut env = Environment::new();

        match SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()
        {
            Ok(syntax) => env.set_syntax(syntax),
            Err(e) => log::error!("Failed to configure stub template syntax: {e}"),
        }
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);
        env.set_loader(stub_loader);

        env
    })
}

fn stub_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = if std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    };

    let Some(file) = StubTemplates::get(&filename) else {
        return Ok(None);
    };
    match std::str::from_utf8(file.data.as_ref()) {
        Ok(source) => Ok(Some(source.to_string())),
        Err(e) => Err(Error::new(
            ErrorKind::TemplateNotFound,
            format!("Stub template '{filename}' is not UTF-8: {e}"),
        )),
    }
}

// ============================================================================
// Stub context
// ============================================================================

#[derive(Debug, Serialize)]
struct DefineItem<'a> {
    name: &'a str,
    value: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct FieldItem<'a> {
    name: &'a str,
    ty: String,
}

#[derive(Debug, Serialize)]
struct StructItem<'a> {
    name: String,
    fields: Vec<FieldItem<'a>>,
}

#[derive(Debug, Serialize)]
struct InputItem<'a> {
    location: u32,
    name: &'a str,
    ty: &'static str,
}

#[derive(Debug, Serialize)]
struct BindingItem<'a> {
    group: usize,
    binding: usize,
    /// Address space including its angle brackets, empty for textures.
    space: &'static str,
    name: &'a str,
    ty: String,
}

#[derive(Debug, Serialize)]
struct PushConstantItem<'a> {
    name: &'a str,
    ty: String,
}

/// Everything one stage of a program declares, in declaration order.
#[derive(Debug, Serialize)]
struct StubContext<'a> {
    stage: &'static str,
    program: &'a str,
    defines: Vec<DefineItem<'a>>,
    structs: Vec<StructItem<'a>>,
    inputs: Vec<InputItem<'a>>,
    bindings: Vec<BindingItem<'a>>,
    push_constants: Vec<PushConstantItem<'a>>,
}

fn struct_name(name: &str) -> String {
    format!("{name}_t")
}

fn field_type(field: &BufferField) -> String {
    if field.count == 1 {
        field.ty.wgsl_name().to_string()
    } else {
        format!("array<{}, {}>", field.ty.wgsl_name(), field.count)
    }
}

fn struct_item<'a>(name: &str, fields: &'a [BufferField]) -> StructItem<'a> {
    StructItem {
        name: struct_name(name),
        fields: fields
            .iter()
            .map(|f| FieldItem {
                name: &f.name,
                ty: field_type(f),
            })
            .collect(),
    }
}

impl<'a> StubContext<'a> {
    fn new(bindings: &'a ShaderBindings, stage: ShaderStage, program: &'a str) -> Self {
        let mask = stage.mask();
        let mut ctx = Self {
            stage: stage.name(),
            program,
            defines: Vec::new(),
            structs: Vec::new(),
            inputs: Vec::new(),
            bindings: Vec::new(),
            push_constants: Vec::new(),
        };

        ctx.defines = bindings
            .defines
            .iter()
            .filter(|d| d.stages.intersects(mask))
            .map(|d| DefineItem {
                name: &d.name,
                value: d.value.as_deref(),
            })
            .collect();

        if stage == ShaderStage::Vertex {
            ctx.inputs = bindings
                .attributes
                .iter()
                .map(|a| InputItem {
                    location: a.location,
                    name: &a.name,
                    ty: a.ty.wgsl_name(),
                })
                .collect();
        }

        // Group indices stay global so every stage agrees on them.
        for (group, set) in bindings.constant_sets.iter().enumerate() {
            if !set.stages.intersects(mask) {
                continue;
            }
            for (binding, constant) in set.constants.iter().enumerate() {
                let (space, ty) = match constant {
                    ConstantDesc::Sampler { kind, .. } => (
                        "",
                        match kind {
                            SamplerKind::Texture2D => "texture_2d<f32>".to_string(),
                            SamplerKind::Cube => "texture_cube<f32>".to_string(),
                        },
                    ),
                    ConstantDesc::Buffer(desc) => {
                        ctx.structs.push(struct_item(&desc.name, &desc.fields));
                        ("<uniform>", struct_name(&desc.name))
                    }
                    ConstantDesc::RawBuffer { writable, .. } => (
                        if *writable {
                            "<storage, read_write>"
                        } else {
                            "<storage, read>"
                        },
                        "array<u32>".to_string(),
                    ),
                };
                ctx.bindings.push(BindingItem {
                    group,
                    binding,
                    space,
                    name: constant.name(),
                    ty,
                });
            }
        }

        for block in bindings.push_constants.iter().filter(|p| p.stages.intersects(mask)) {
            ctx.structs.push(struct_item(&block.name, &block.fields));
            ctx.push_constants.push(PushConstantItem {
                name: &block.name,
                ty: struct_name(&block.name),
            });
        }

        ctx
    }

    /// Canonical declaration lines, in the order the template emits them.
    fn declarations(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for d in &self.defines {
            lines.push(match d.value {
                Some(value) => format!("#define {} {value}", d.name),
                None => format!("#define {}", d.name),
            });
        }
        for s in &self.structs {
            lines.push(format!("struct {} {{", s.name));
            lines.extend(s.fields.iter().map(|f| format!("{}: {},", f.name, f.ty)));
            lines.push("};".to_string());
        }
        for i in &self.inputs {
            lines.push(format!("@location({}) var<in> {}: {};", i.location, i.name, i.ty));
        }
        for b in &self.bindings {
            lines.push(format!(
                "@group({}) @binding({}) var{} {}: {};",
                b.group, b.binding, b.space, b.name, b.ty
            ));
        }
        for p in &self.push_constants {
            lines.push(format!("var<push_constant> {}: {};", p.name, p.ty));
        }
        lines
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Renders the declaration stub of `stage` for a program named `program`.
pub fn render_stub(bindings: &ShaderBindings, stage: ShaderStage, program: &str) -> Result<String> {
    let ctx = StubContext::new(bindings, stage, program);
    let template = get_env().get_template(STUB_TEMPLATE)?;
    Ok(template.render(&ctx)?)
}

/// Collapses whitespace runs so formatting differences never count as mismatches.
fn normalize(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Checks that `source` declares exactly what `bindings` expects for `stage`,
/// in the same order.
///
/// Blank lines and `//` comments are ignored. The first differing
/// declaration is reported with its 1-based source line.
pub fn validate_stub(source: &str, bindings: &ShaderBindings, stage: ShaderStage) -> Result<()> {
    const END: &str = "<end of stub>";

    let expected = StubContext::new(bindings, stage, "").declarations();
    let mut found = source
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, normalize(line)))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with("//"));

    let mut last_line = 0;
    for want in expected {
        match found.next() {
            Some((line, got)) if got == want => last_line = line,
            Some((line, got)) => {
                return Err(RhiError::StubMismatch {
                    stage: stage.name(),
                    line,
                    expected: want,
                    found: got,
                });
            }
            None => {
                return Err(RhiError::StubMismatch {
                    stage: stage.name(),
                    line: last_line + 1,
                    expected: want,
                    found: END.to_string(),
                });
            }
        }
    }

    if let Some((line, got)) = found.next() {
        return Err(RhiError::StubMismatch {
            stage: stage.name(),
            line,
            expected: END.to_string(),
            found: got,
        });
    }
    Ok(())
}
