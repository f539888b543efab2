//! `scriptblock layout`: native memory layout of each type.

use anyhow::Context;
use scriptblock_core::{struct_layout, BridgeRuntime, TypeDescriptor};

use crate::output::StyledOutput;

pub fn execute(out: &mut StyledOutput, encoding: &str) -> anyhow::Result<()> {
    let signature = BridgeRuntime::global()
        .signature(encoding)
        .with_context(|| format!("cannot parse '{encoding}'"))?;

    for (index, ty) in signature.descriptors().iter().enumerate() {
        let label = if index == 0 {
            "return".to_string()
        } else {
            format!("arg {}", index - 1)
        };
        describe(out, &label, ty, 0);
    }
    Ok(())
}

fn describe(out: &mut StyledOutput, label: &str, ty: &TypeDescriptor, depth: usize) {
    let layout = ty.layout();
    let indent = "  ".repeat(depth);
    out.info(&format!("{indent}{label:<10}"));
    out.plain(&format!(
        "size {:>4}  align {:>2}  {}",
        layout.size, layout.align, ty
    ));
    out.newline();

    match ty {
        TypeDescriptor::Struct { fields, .. } => {
            let fields_layout = struct_layout(fields);
            for (field, offset) in fields.iter().zip(&fields_layout.offsets) {
                describe(out, &format!("+{offset}"), field, depth + 1);
            }
        }
        TypeDescriptor::Array { element, .. } => describe(out, "element", element, depth + 1),
        _ => {}
    }
}
