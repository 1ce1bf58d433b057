//! In-process simulation of the native library
//!
//! Implements every native trait without linking libcrypto. Errors are packed
//! the way libcrypto packs them, native allocations are counted so tests can
//! assert nothing leaked, and allocation failures can be injected on demand.
//! Store contexts carry their own ex-data side tables.

use super::{
    CertificateApi, DefaultPassphrase, ErrorQueue, MemoryDebug, NativeLibrary, StoreContextApi,
};
use crate::ffi::types::{pack_error, unpack_error, ErrorCode, ExDataSlot, X509_V_OK};
use crate::value::Certificate;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::ffi::{c_void, CStr};
use std::os::raw::c_int;
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};

/// Version banner reported by the simulation
pub const SIM_VERSION_TEXT: &str = "osslbind simulated libcrypto 3.0.0";

/// Version number reported by the simulation
pub const SIM_VERSION_NUMBER: u64 = 0x3000_0000;

static NEXT_EX_INDEX: AtomicI32 = AtomicI32::new(0);

#[derive(Debug, Default)]
struct NameTable {
    libraries: Vec<String>,
    functions: Vec<String>,
    reasons: Vec<String>,
}

fn intern(table: &mut Vec<String>, name: &str) -> u32 {
    let index = match table.iter().position(|n| n == name) {
        Some(index) => index,
        None => {
            table.push(name.to_string());
            table.len() - 1
        }
    };
    index as u32 + 1
}

fn lookup(table: &[String], packed: u32) -> Option<&str> {
    let index = usize::try_from(packed).ok()?.checked_sub(1)?;
    table.get(index).map(String::as_str)
}

/// Counts one live native allocation for as long as it exists
#[derive(Debug)]
struct LiveGuard(Rc<Cell<usize>>);

impl LiveGuard {
    fn new(counter: &Rc<Cell<usize>>) -> Self {
        counter.set(counter.get() + 1);
        Self(Rc::clone(counter))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Native certificate owned by the simulation
#[derive(Debug)]
pub struct SimCertificate {
    der: Rc<[u8]>,
    id: u64,
    _live: LiveGuard,
}

impl SimCertificate {
    /// DER bytes of this copy
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Allocation identity, unique per duplicated certificate
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Native certificate stack owned by the simulation
#[derive(Debug)]
pub struct SimStack {
    certs: Vec<SimCertificate>,
    _live: LiveGuard,
}

impl SimStack {
    /// Elements in push order
    pub fn certificates(&self) -> &[SimCertificate] {
        &self.certs
    }
}

/// Simulated native library
#[derive(Debug)]
pub struct SimLibrary {
    queue: RefCell<VecDeque<ErrorCode>>,
    names: RefCell<NameTable>,
    leak_checks: RefCell<Vec<bool>>,
    prompt_answer: RefCell<Option<Vec<u8>>>,
    prompt_calls: Cell<usize>,
    strings_loaded: Cell<bool>,
    live: Rc<Cell<usize>>,
    next_id: Cell<u64>,
    fail_stack: Cell<bool>,
    fail_duplicate: Cell<bool>,
}

impl SimLibrary {
    /// Create a simulation with an empty error queue and no prompt answer
    pub fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            names: RefCell::new(NameTable::default()),
            leak_checks: RefCell::new(Vec::new()),
            prompt_answer: RefCell::new(None),
            prompt_calls: Cell::new(0),
            strings_loaded: Cell::new(false),
            live: Rc::new(Cell::new(0)),
            next_id: Cell::new(1),
            fail_stack: Cell::new(false),
            fail_duplicate: Cell::new(false),
        }
    }

    /// Record a native failure, returning its packed code
    pub fn push_error(&self, library: &str, function: &str, reason: &str) -> ErrorCode {
        let code = {
            let mut names = self.names.borrow_mut();
            let lib = intern(&mut names.libraries, library);
            let func = intern(&mut names.functions, function);
            let reason = intern(&mut names.reasons, reason);
            pack_error(lib, func, reason)
        };
        self.queue.borrow_mut().push_back(code);
        code
    }

    /// Record a raw code the library has no strings for
    pub fn push_raw_error(&self, code: ErrorCode) {
        self.queue.borrow_mut().push_back(code);
    }

    /// Number of queued error entries
    pub fn pending_errors(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Every leak-checking toggle received, in order
    pub fn leak_check_calls(&self) -> Vec<bool> {
        self.leak_checks.borrow().clone()
    }

    /// Answer the default prompt returns; `None` makes the prompt fail
    pub fn set_prompt_answer(&self, answer: Option<&str>) {
        *self.prompt_answer.borrow_mut() = answer.map(|a| a.as_bytes().to_vec());
    }

    /// How many times the default passphrase handler ran
    pub fn prompt_calls(&self) -> usize {
        self.prompt_calls.get()
    }

    /// Whether error strings were loaded
    pub fn strings_loaded(&self) -> bool {
        self.strings_loaded.get()
    }

    /// Native stacks and certificates currently allocated
    pub fn live_allocations(&self) -> usize {
        self.live.get()
    }

    /// Make the next stack allocation fail
    pub fn fail_next_stack(&self) {
        self.fail_stack.set(true);
    }

    /// Make certificate duplication fail until reset
    pub fn fail_duplication(&self, fail: bool) {
        self.fail_duplicate.set(fail);
    }
}

impl Default for SimLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorQueue for SimLibrary {
    fn get_error(&self) -> Option<ErrorCode> {
        self.queue.borrow_mut().pop_front()
    }

    fn clear_error(&self) {
        self.queue.borrow_mut().clear();
    }

    fn error_string(&self, code: ErrorCode) -> String {
        let (lib, func, reason) = unpack_error(code);
        let names = self.names.borrow();
        format!(
            "error:{:08X}:{}:{}:{}",
            code,
            lookup(&names.libraries, lib).unwrap_or("lib(0)"),
            lookup(&names.functions, func).unwrap_or("func(0)"),
            lookup(&names.reasons, reason).unwrap_or("reason(0)"),
        )
    }

    fn reason_error_string(&self, code: ErrorCode) -> Option<String> {
        let (_, _, reason) = unpack_error(code);
        lookup(&self.names.borrow().reasons, reason).map(str::to_string)
    }
}

impl MemoryDebug for SimLibrary {
    fn set_leak_checking(&self, enabled: bool) {
        self.leak_checks.borrow_mut().push(enabled);
    }
}

impl DefaultPassphrase for SimLibrary {
    fn default_passphrase(&self, buf: &mut [u8], _encrypt: bool, password: Option<&CStr>) -> c_int {
        self.prompt_calls.set(self.prompt_calls.get() + 1);
        let answer = match password {
            Some(password) => password.to_bytes().to_vec(),
            None => match self.prompt_answer.borrow().as_ref() {
                Some(answer) => answer.clone(),
                None => return -1,
            },
        };
        let len = answer.len().min(buf.len());
        buf[..len].copy_from_slice(&answer[..len]);
        c_int::try_from(len).unwrap_or(-1)
    }
}

impl NativeLibrary for SimLibrary {
    fn load_error_strings(&self) {
        self.strings_loaded.set(true);
    }

    fn version_text(&self) -> String {
        SIM_VERSION_TEXT.to_string()
    }

    fn version_number(&self) -> u64 {
        SIM_VERSION_NUMBER
    }
}

impl CertificateApi for SimLibrary {
    type Certificate = SimCertificate;
    type Stack = SimStack;

    fn new_stack(&self) -> Option<SimStack> {
        if self.fail_stack.replace(false) {
            self.push_error("STACK", "sk_new_null", "malloc failure");
            return None;
        }
        Some(SimStack {
            certs: Vec::new(),
            _live: LiveGuard::new(&self.live),
        })
    }

    fn duplicate(&self, cert: &Certificate) -> Option<SimCertificate> {
        if self.fail_duplicate.get() {
            self.push_error("X509", "X509_dup", "malloc failure");
            return None;
        }
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Some(SimCertificate {
            der: Rc::from(cert.der()),
            id,
            _live: LiveGuard::new(&self.live),
        })
    }

    fn push(&self, stack: &mut SimStack, cert: SimCertificate) -> Result<(), SimCertificate> {
        stack.certs.push(cert);
        Ok(())
    }

    fn free_certificate(&self, cert: SimCertificate) {
        drop(cert);
    }

    fn len(&self, stack: &SimStack) -> usize {
        stack.certs.len()
    }

    fn get<'s>(&self, stack: &'s SimStack, index: usize) -> Option<&'s SimCertificate> {
        stack.certs.get(index)
    }

    fn to_managed(&self, cert: &SimCertificate) -> Certificate {
        Certificate::from_der(cert.der.to_vec())
    }

    fn free_stack(&self, stack: SimStack) {
        drop(stack);
    }
}

/// Ex-data side table keyed by slot index
#[derive(Debug, Default)]
struct ExData(RefCell<HashMap<c_int, *mut c_void>>);

impl ExData {
    fn get(&self, slot: ExDataSlot) -> *mut c_void {
        self.0
            .borrow()
            .get(&slot.as_raw())
            .copied()
            .unwrap_or(std::ptr::null_mut())
    }

    fn set(&self, slot: ExDataSlot, data: *mut c_void) {
        self.0.borrow_mut().insert(slot.as_raw(), data);
    }
}

/// Simulated certificate store (`X509_STORE`)
#[derive(Debug, Default)]
pub struct SimStore {
    ex_data: ExData,
}

impl SimStore {
    /// Create a store with an empty side table
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Store an association under `slot`
    pub fn set_ex_data(&self, slot: ExDataSlot, data: *mut c_void) {
        self.ex_data.set(slot, data);
    }
}

/// Simulated verification context (`X509_STORE_CTX`)
#[derive(Debug)]
pub struct SimStoreCtx {
    store: Option<Rc<SimStore>>,
    ex_data: ExData,
    error: Cell<c_int>,
    depth: Cell<c_int>,
}

impl SimStoreCtx {
    /// Create a context, optionally belonging to `store`
    pub fn new(store: Option<Rc<SimStore>>) -> Self {
        Self {
            store,
            ex_data: ExData::default(),
            error: Cell::new(X509_V_OK),
            depth: Cell::new(0),
        }
    }

    /// Store an association under `slot`
    pub fn set_ex_data(&self, slot: ExDataSlot, data: *mut c_void) {
        self.ex_data.set(slot, data);
    }

    /// Recorded verification error
    pub fn error(&self) -> c_int {
        self.error.get()
    }

    /// Record a verification error, as the native checks would
    pub fn set_error(&self, error: c_int) {
        self.error.set(error);
    }

    /// Set the chain depth being checked
    pub fn set_depth(&self, depth: c_int) {
        self.depth.set(depth);
    }
}

impl StoreContextApi for SimLibrary {
    type StoreCtx = SimStoreCtx;

    fn new_ex_index(name: &'static CStr) -> Option<ExDataSlot> {
        let index = NEXT_EX_INDEX.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(target: "osslbind::native", ?name, index, "registered ex-data slot");
        ExDataSlot::from_raw(index)
    }

    unsafe fn ctx_ex_data(ctx: *mut SimStoreCtx, slot: ExDataSlot) -> *mut c_void {
        (*ctx).ex_data.get(slot)
    }

    unsafe fn store_ex_data(ctx: *mut SimStoreCtx, slot: ExDataSlot) -> *mut c_void {
        match &(*ctx).store {
            Some(store) => store.ex_data.get(slot),
            None => std::ptr::null_mut(),
        }
    }

    unsafe fn error(ctx: *mut SimStoreCtx) -> c_int {
        (*ctx).error.get()
    }

    unsafe fn set_error(ctx: *mut SimStoreCtx, error: c_int) {
        (*ctx).error.set(error);
    }

    unsafe fn error_depth(ctx: *mut SimStoreCtx) -> c_int {
        (*ctx).depth.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_queue_is_fifo_and_named() {
        let sim = SimLibrary::new();
        let first = sim.push_error("PEM", "PEM_read_bio", "no start line");
        sim.push_error("X509", "X509_verify", "bad signature");

        assert_eq!(sim.get_error(), Some(first));
        assert_eq!(sim.reason_error_string(first).as_deref(), Some("no start line"));
        assert_eq!(
            sim.error_string(first),
            format!("error:{:08X}:PEM:PEM_read_bio:no start line", first)
        );
        assert_eq!(sim.pending_errors(), 1);
        sim.clear_error();
        assert_eq!(sim.get_error(), None);
    }

    #[test]
    fn test_unknown_code_has_no_reason() {
        let sim = SimLibrary::new();
        assert_eq!(sim.reason_error_string(0x0B00_0FFF), None);
    }

    #[test]
    fn test_default_passphrase_copies_direct_password() {
        let sim = SimLibrary::new();
        let mut buf = [0u8; 4];
        let password = CStr::from_bytes_with_nul(b"longsecret\0").unwrap();
        assert_eq!(sim.default_passphrase(&mut buf, false, Some(password)), 4);
        assert_eq!(&buf, b"long");
    }

    #[test]
    fn test_default_prompt_without_answer_fails() {
        let sim = SimLibrary::new();
        let mut buf = [0u8; 16];
        assert_eq!(sim.default_passphrase(&mut buf, true, None), -1);
        sim.set_prompt_answer(Some("typed"));
        assert_eq!(sim.default_passphrase(&mut buf, true, None), 5);
        assert_eq!(sim.prompt_calls(), 2);
    }

    #[test]
    fn test_allocations_are_counted() {
        let sim = SimLibrary::new();
        let cert = Certificate::from_der(vec![1, 2, 3]);
        let mut stack = sim.new_stack().unwrap();
        let dup = sim.duplicate(&cert).unwrap();
        sim.push(&mut stack, dup).unwrap();
        assert_eq!(sim.live_allocations(), 2);
        sim.free_stack(stack);
        assert_eq!(sim.live_allocations(), 0);
    }

    #[test]
    fn test_injected_stack_failure_is_one_shot() {
        let sim = SimLibrary::new();
        sim.fail_next_stack();
        assert!(sim.new_stack().is_none());
        assert_eq!(sim.pending_errors(), 1);
        assert!(sim.new_stack().is_some());
    }

    #[test]
    fn test_store_fallback_table() {
        let slot = SimLibrary::new_ex_index(c"test_slot").unwrap();
        let store = SimStore::new();
        let mut marker = 7u8;
        store.set_ex_data(slot, (&mut marker as *mut u8).cast());
        let mut ctx = SimStoreCtx::new(Some(store));

        unsafe {
            assert!(SimLibrary::ctx_ex_data(&mut ctx, slot).is_null());
            assert!(!SimLibrary::store_ex_data(&mut ctx, slot).is_null());
        }
    }
}
