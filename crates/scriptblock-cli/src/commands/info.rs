//! `scriptblock info`: version, limits and environment.

use scriptblock_core::{BridgeRuntime, MAX_ARGUMENTS, MAX_NESTING_DEPTH, MAX_TYPE_SIZE};

use crate::output::StyledOutput;

pub fn execute(out: &mut StyledOutput) -> anyhow::Result<()> {
    let runtime = BridgeRuntime::global();
    let options = runtime.options();

    out.bold(&format!("scriptblock v{}", env!("CARGO_PKG_VERSION")));
    out.newline();
    out.newline();

    out.field(
        "Platform",
        &format!("{} ({})", std::env::consts::OS, std::env::consts::ARCH),
    );
    out.field("Pointer size", &format!("{} bytes", std::mem::size_of::<usize>()));
    out.field(
        "Max arguments",
        &format!("{} (hard limit {MAX_ARGUMENTS})", options.argument_limit()),
    );
    out.field("Max nesting", &MAX_NESTING_DEPTH.to_string());
    out.field("Max struct", &format!("{MAX_TYPE_SIZE} bytes"));
    out.field("Report buffer", &options.report_capacity.to_string());
    out.field("Handle table", &runtime.handles().capacity().to_string());
    out.field("Trace calls", &options.trace_invocations.to_string());

    out.newline();
    out.bold("Environment");
    out.newline();
    for name in [
        "SCRIPTBLOCK_LOG",
        "SCRIPTBLOCK_MAX_ARGUMENTS",
        "SCRIPTBLOCK_REPORT_CAPACITY",
        "SCRIPTBLOCK_HANDLE_CAPACITY",
        "SCRIPTBLOCK_TRACE_INVOCATIONS",
    ] {
        let value = std::env::var(name).unwrap_or_else(|_| "(not set)".to_string());
        out.plain(&format!("  {name:<30} {value}"));
        out.newline();
    }
    Ok(())
}
