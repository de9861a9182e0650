//! String marshalling across the module boundary.
//!
//! Every string the bridge passes into the module travels as a
//! NUL-terminated UTF-8 buffer allocated in module memory. [`NativeBuf`]
//! owns one such allocation and releases it exactly once; the scoped
//! [`with_str`]/[`with_str2`] helpers are what call sites use so the buffer
//! is released on every exit path, including when the wrapped native call
//! fails.

use crate::error::BridgeError;
use crate::Result;
use plotwire_module_api::{ChartModule, ModuleError, ModulePtr};
use std::cell::Cell;
use std::rc::Rc;

/// Decode a module fault code into the taxonomy error, reading the module's
/// error table when it cooperates.
pub fn decode_fault(module: &dyn ChartModule, err: ModuleError) -> BridgeError {
    let message = module
        .error_message(err.code)
        .ok()
        .filter(|ptr| !ptr.is_null())
        .and_then(|ptr| module.read_cstr(ptr).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_else(|| "unknown module error".to_string());
    BridgeError::ModuleFault {
        code: err.code,
        message,
    }
}

/// A host string copied into module memory, owned by the bridge side.
pub struct NativeBuf {
    module: Rc<dyn ChartModule>,
    ptr: ModulePtr,
    released: Cell<bool>,
}

impl NativeBuf {
    /// Allocate module memory for `text` plus terminator and copy the
    /// encoded bytes in. The returned buffer owns the allocation.
    pub fn copy_from(module: &Rc<dyn ChartModule>, text: &str) -> Result<NativeBuf> {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);

        let ptr = module
            .alloc(bytes.len())
            .map_err(|e| decode_fault(&**module, e))?;
        if let Err(e) = module.write_bytes(ptr, &bytes) {
            // The allocation must not leak just because the copy failed.
            if let Err(release_err) = module.release(ptr) {
                log::warn!("releasing buffer after failed copy also failed: {release_err}");
            }
            return Err(decode_fault(&**module, e));
        }
        Ok(NativeBuf {
            module: module.clone(),
            ptr,
            released: Cell::new(false),
        })
    }

    #[inline]
    pub fn ptr(&self) -> ModulePtr {
        self.ptr
    }

    /// Release the buffer. The first call frees the module memory; later
    /// calls are no-ops. Failures are reported once and the buffer is
    /// considered gone either way (no double-free on Drop).
    pub fn release(&self) -> Result<()> {
        if self.released.replace(true) {
            return Ok(());
        }
        self.module
            .release(self.ptr)
            .map_err(|e| decode_fault(&*self.module, e))
    }
}

impl Drop for NativeBuf {
    fn drop(&mut self) {
        if !self.released.get() {
            if let Err(err) = self.release() {
                log::warn!("native buffer {:?} leaked: {err}", self.ptr);
            }
        }
    }
}

/// Decode a module-owned NUL-terminated buffer into a host string. Never
/// takes ownership of or frees the buffer.
pub fn read_string(module: &dyn ChartModule, ptr: ModulePtr) -> Result<String> {
    if ptr.is_null() {
        return Err(BridgeError::marshalling("null string pointer from module"));
    }
    let bytes = module.read_cstr(ptr).map_err(|e| decode_fault(module, e))?;
    String::from_utf8(bytes)
        .map_err(|e| BridgeError::marshalling(format!("module string is not UTF-8: {e}")))
}

/// Run `f` with `text` marshalled into module memory, releasing the buffer
/// on all exit paths. A release failure must not mask an error already in
/// flight from the primary call; with no primary error it propagates as its
/// own marshalling failure.
pub fn with_str<T>(
    module: &Rc<dyn ChartModule>,
    text: &str,
    f: impl FnOnce(ModulePtr) -> Result<T>,
) -> Result<T> {
    let buf = NativeBuf::copy_from(module, text)?;
    let primary = f(buf.ptr());
    settle_release(primary, buf.release())
}

/// Two-buffer variant for (path, value)-shaped calls.
pub fn with_str2<T>(
    module: &Rc<dyn ChartModule>,
    first: &str,
    second: &str,
    f: impl FnOnce(ModulePtr, ModulePtr) -> Result<T>,
) -> Result<T> {
    with_str(module, first, |a| with_str(module, second, |b| f(a, b)))
}

fn settle_release<T>(primary: Result<T>, released: Result<()>) -> Result<T> {
    match (primary, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => Err(release_err),
        (Err(primary_err), Ok(())) => Err(primary_err),
        (Err(primary_err), Err(release_err)) => {
            log::warn!("buffer release failed while propagating {primary_err}: {release_err}");
            Err(primary_err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_error_does_not_mask_primary() {
        let primary: Result<()> = Err(BridgeError::marshalling("primary"));
        let released: Result<()> = Err(BridgeError::marshalling("release"));
        let out = settle_release(primary, released);
        assert_eq!(out, Err(BridgeError::marshalling("primary")));
    }

    #[test]
    fn release_error_surfaces_when_primary_succeeded() {
        let out = settle_release(Ok(1), Err(BridgeError::marshalling("release")));
        assert_eq!(out, Err(BridgeError::marshalling("release")));
    }
}
