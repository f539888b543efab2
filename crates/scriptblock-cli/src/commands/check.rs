//! `scriptblock check`: build a trampoline for each encoding.

use scriptblock_core::{BridgeRuntime, ScriptFunctionHandle, ScriptValue};

use crate::output::StyledOutput;

pub fn execute(out: &mut StyledOutput, encodings: &[String]) -> anyhow::Result<()> {
    let runtime = BridgeRuntime::global();
    let noop = ScriptFunctionHandle::from_fn(|_| Ok(ScriptValue::Undefined));
    let mut failures = 0;
    tracing::debug!(target: "scriptblock::cli", count = encodings.len(), "checking encodings");

    for encoding in encodings {
        match runtime.make_bridge(encoding, noop.clone()) {
            Ok(bridge) => {
                out.success("ok     ");
                out.plain(&format!("{encoding}  {}", bridge.signature()));
            }
            Err(err) => {
                failures += 1;
                out.error("error  ");
                out.plain(&format!("{encoding}  {err}"));
            }
        }
        out.newline();
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} encodings failed", encodings.len());
    }
    Ok(())
}
