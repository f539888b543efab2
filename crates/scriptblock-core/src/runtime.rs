//! Bridge runtime
//!
//! Bundles the collaborators every bridge needs: the signature cache, the
//! handle table, the report channel, the native class registry and the
//! options. One global runtime exists per process; tests and embedders that
//! want isolation build their own.

use std::ffi::c_void;
use std::sync::Arc;

use once_cell::sync::Lazy;
use scriptblock_sdk::ScriptFunctionHandle;
use tracing::{debug, warn};

use crate::block::signature_for_block;
use crate::bridge::Bridge;
use crate::cache::SignatureCache;
use crate::encoding::TypeSignature;
use crate::error::SignatureResult;
use crate::globals::NativeClassRegistry;
use crate::handles::HandleTable;
use crate::marshal::InvocationTarget;
use crate::options::BridgeOptions;
use crate::report::Reporter;

static GLOBAL_RUNTIME: Lazy<BridgeRuntime> = Lazy::new(|| {
    BridgeRuntime::builder()
        .cache(SignatureCache::global())
        .options(BridgeOptions::from_env())
        .build()
});

/// Shared state for building and invoking bridges
#[derive(Debug)]
pub struct BridgeRuntime {
    cache: Arc<SignatureCache>,
    handles: Arc<HandleTable>,
    reporter: Reporter,
    classes: NativeClassRegistry,
    options: BridgeOptions,
}

impl BridgeRuntime {
    /// The process-wide runtime (uses the global signature cache)
    pub fn global() -> &'static BridgeRuntime {
        &GLOBAL_RUNTIME
    }

    /// Create an isolated runtime with default options
    pub fn new() -> Self {
        Self::with_options(BridgeOptions::default())
    }

    /// Create an isolated runtime with specific options
    pub fn with_options(options: BridgeOptions) -> Self {
        Self::builder().options(options).build()
    }

    /// Start building a runtime with injected collaborators
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Build a bridge exposing `function` with the native signature `encoding`.
    pub fn make_bridge(
        &self,
        encoding: &str,
        function: ScriptFunctionHandle,
    ) -> SignatureResult<Bridge> {
        let signature = self.signature(encoding)?;
        let target = InvocationTarget::new(
            signature,
            function,
            Arc::clone(&self.handles),
            self.reporter.clone(),
        )
        .with_tracing(self.options.trace_invocations);

        let bridge = Bridge::new(target, &self.options).map_err(|err| {
            warn!(target: "scriptblock::parse", encoding, error = %err, "cannot build trampoline");
            err
        })?;
        debug!(
            target: "scriptblock::bridge",
            encoding,
            function = bridge.function().name().unwrap_or("<anonymous>"),
            "bridge created"
        );
        Ok(bridge)
    }

    /// Parse (or fetch from the cache) a signature
    pub fn signature(&self, encoding: &str) -> SignatureResult<Arc<TypeSignature>> {
        self.cache.get_or_parse(encoding).map_err(|err| {
            warn!(target: "scriptblock::parse", encoding, error = %err, "rejected signature");
            err
        })
    }

    /// Parsed signature of a native block, if it carries a valid one.
    ///
    /// # Safety
    ///
    /// See `block::signature_for_block`.
    pub unsafe fn block_signature(&self, block: *const c_void) -> Option<Arc<TypeSignature>> {
        let encoding = signature_for_block(block)?.to_str().ok()?;
        self.signature(encoding).ok()
    }

    /// Signature cache
    pub fn cache(&self) -> &Arc<SignatureCache> {
        &self.cache
    }

    /// Handle table
    pub fn handles(&self) -> &Arc<HandleTable> {
        &self.handles
    }

    /// Invocation report channel
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Native class registry for global lookups
    pub fn classes(&self) -> &NativeClassRegistry {
        &self.classes
    }

    /// Options in effect
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }
}

impl Default for BridgeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `BridgeRuntime`
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    cache: Option<Arc<SignatureCache>>,
    handles: Option<Arc<HandleTable>>,
    options: BridgeOptions,
}

impl RuntimeBuilder {
    /// Use a shared signature cache
    pub fn cache(mut self, cache: Arc<SignatureCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a shared handle table
    pub fn handles(mut self, handles: Arc<HandleTable>) -> Self {
        self.handles = Some(handles);
        self
    }

    /// Set options
    pub fn options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Finish building
    pub fn build(self) -> BridgeRuntime {
        let handles = self
            .handles
            .unwrap_or_else(|| Arc::new(HandleTable::with_capacity(self.options.handle_capacity)));
        BridgeRuntime {
            cache: self.cache.unwrap_or_default(),
            classes: NativeClassRegistry::new(Arc::clone(&handles)),
            handles,
            reporter: Reporter::new(self.options.report_capacity),
            options: self.options,
        }
    }
}

/// Build a bridge with the global runtime.
///
/// ```ignore
/// let double = ScriptFunctionHandle::from_fn(|args| {
///     Ok(ScriptValue::Number(args[0].as_number().unwrap_or(0.0) * 2.0))
/// });
/// let bridge = scriptblock_core::make_bridge("i@:i", double)?;
/// let f: extern "C" fn(*const c_void, *const c_void, i32) -> i32 = unsafe { bridge.as_fn() };
/// assert_eq!(f(ptr::null(), ptr::null(), 5), 10);
/// ```
pub fn make_bridge(encoding: &str, function: ScriptFunctionHandle) -> SignatureResult<Bridge> {
    BridgeRuntime::global().make_bridge(encoding, function)
}
