//! Pluggable simulation routines. A routine owns the run loop for one
//! job kind; the built-in registry covers the ones this crate ships
//! (currently MMCFE), and an optional `libloading`-backed loader can
//! pull in externally compiled ones at runtime.

use std::path::Path;

use crate::context::Context;
use crate::error::{EngineError, EngineResult};
use crate::mmcfe::{MmcFeRoutine, MMCFE_UUID};

/// A runnable simulation routine, identified by a fixed UUID so a saved
/// state image can record which routine produced it.
pub trait Routine {
    fn uuid(&self) -> [u8; 16];
    fn name(&self) -> &'static str;
    fn run(&mut self, ctx: &mut Context) -> EngineResult<()>;
}

/// The routines compiled directly into this crate.
pub struct BuiltinRoutineRegistry {
    mmcfe: MmcFeRoutine,
}

impl BuiltinRoutineRegistry {
    pub fn new() -> Self {
        BuiltinRoutineRegistry {
            mmcfe: MmcFeRoutine::new(),
        }
    }

    pub fn find(&mut self, uuid: [u8; 16]) -> Option<&mut dyn Routine> {
        if uuid == MMCFE_UUID {
            Some(&mut self.mmcfe)
        } else {
            None
        }
    }
}

impl Default for BuiltinRoutineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbol names an external routine plugin must export.
const SYMBOL_GET_UUID: &[u8] = b"get_uuid";
const SYMBOL_GET_ENTRY: &[u8] = b"get_entry";

/// A routine loaded from a dynamic library matching `*.mocext.<dl-suffix>`.
/// The library must export `get_uuid() -> [u8; 16]` and
/// `get_entry() -> extern "C" fn(*mut Context) -> i32`.
pub struct DynamicRoutine {
    _library: libloading::Library,
    uuid: [u8; 16],
    entry: extern "C" fn(*mut Context) -> i32,
}

impl DynamicRoutine {
    /// # Safety
    /// The library at `path` must actually export `get_uuid`/`get_entry`
    /// with the signatures above; an incompatible library invokes
    /// undefined behavior through the raw symbol lookup.
    pub unsafe fn load(path: &Path) -> EngineResult<Self> {
        let library = libloading::Library::new(path).map_err(|_| EngineError::RoutineLoad("failed to load symbol".into()))?;
        let get_uuid: libloading::Symbol<extern "C" fn() -> [u8; 16]> =
            library.get(SYMBOL_GET_UUID).map_err(|_| EngineError::RoutineLoad("failed to load symbol".into()))?;
        let get_entry: libloading::Symbol<extern "C" fn() -> extern "C" fn(*mut Context) -> i32> =
            library.get(SYMBOL_GET_ENTRY).map_err(|_| EngineError::RoutineLoad("failed to load symbol".into()))?;
        let uuid = get_uuid();
        let entry = get_entry();
        Ok(DynamicRoutine {
            _library: library,
            uuid,
            entry,
        })
    }
}

impl Routine for DynamicRoutine {
    fn uuid(&self) -> [u8; 16] {
        self.uuid
    }

    fn name(&self) -> &'static str {
        "dynamic"
    }

    fn run(&mut self, ctx: &mut Context) -> EngineResult<()> {
        let code = (self.entry)(ctx as *mut Context);
        if code == 0 {
            Ok(())
        } else {
            Err(EngineError::RoutineLoad(format!(
                "routine entry point returned status {code}"
            )))
        }
    }
}

/// Scans a directory for `*.mocext.<dl-suffix>` files and loads each as
/// a `DynamicRoutine`. Files that fail to load (missing symbols, bad
/// ABI) are skipped rather than aborting the whole scan.
pub fn scan_dynamic_routines(dir: &Path) -> Vec<DynamicRoutine> {
    let suffix = format!(".mocext.{}", std::env::consts::DLL_EXTENSION);
    let mut routines = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return routines;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(&suffix) {
            continue;
        }
        if let Ok(routine) = unsafe { DynamicRoutine::load(&path) } {
            routines.push(routine);
        }
    }
    routines
}
