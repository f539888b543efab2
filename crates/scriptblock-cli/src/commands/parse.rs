//! `scriptblock parse`: describe an encoding.

use anyhow::Context;
use scriptblock_core::BridgeRuntime;

use crate::output::StyledOutput;

pub fn execute(out: &mut StyledOutput, encoding: &str, json: bool) -> anyhow::Result<()> {
    let signature = BridgeRuntime::global()
        .signature(encoding)
        .with_context(|| format!("cannot parse '{encoding}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&*signature)?);
        return Ok(());
    }

    out.field("Encoding", signature.encoding());
    out.field("Canonical", &signature.canonical_encoding());
    out.field("C signature", &signature.to_string());
    out.field("Returns", &signature.return_type().to_string());
    out.newline();

    out.bold("Arguments");
    out.newline();
    if signature.argument_count() == 0 {
        out.plain("  (none)");
        out.newline();
    }
    for (index, argument) in signature.arguments().iter().enumerate() {
        out.plain(&format!("  {index:>2}  {:<8}", argument.to_encoding()));
        out.plain(&argument.to_string());
        if index < signature.implicit_arguments() {
            out.info("  (receiver, not forwarded)");
        }
        out.newline();
    }

    if signature.is_variadic() {
        out.newline();
        out.error("Variadic: a trampoline cannot be built for this signature");
        out.newline();
    }
    Ok(())
}
