//! Dynamic loading of the native library
//!
//! Resolves a library name against platform search paths using `libloading`,
//! applying platform prefixes and extensions. Versioned file names such as
//! `libcrypto.so.3` are tried verbatim.

use libloading::Library;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Library loading errors
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Library file not found in search paths
    LibraryNotFound(String),
    /// Symbol not found in library
    SymbolNotFound { library: String, symbol: String },
    /// Failed to load library
    LoadFailed(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::LibraryNotFound(name) => write!(f, "Library not found: {}", name),
            LoadError::SymbolNotFound { library, symbol } => {
                write!(f, "Symbol '{}' not found in library '{}'", symbol, library)
            }
            LoadError::LoadFailed(msg) => write!(f, "Failed to load library: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

/// Library loader with a per-path cache
///
/// # Safety
///
/// Loading a dynamic library runs its initialization code in this process.
/// Only point the loader at libraries you trust.
pub struct LibraryLoader {
    loaded: HashMap<PathBuf, Arc<Library>>,
    search_paths: Vec<PathBuf>,
}

impl LibraryLoader {
    /// Create a loader with the platform's default search paths
    pub fn new() -> Self {
        Self {
            loaded: HashMap::new(),
            search_paths: Self::default_search_paths(),
        }
    }

    /// Working directory first, then the platform's system library directories
    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/lib"));
            paths.push(PathBuf::from(format!(
                "/usr/lib/{}-linux-gnu",
                std::env::consts::ARCH
            )));

            if cfg!(target_pointer_width = "64") {
                paths.push(PathBuf::from("/usr/lib64"));
                paths.push(PathBuf::from("/lib64"));
            }
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/opt/homebrew/lib"));
            paths.push(PathBuf::from("/opt/homebrew/opt/openssl/lib"));
        }

        #[cfg(target_os = "windows")]
        {
            paths.push(PathBuf::from("C:\\Windows\\System32"));
            if let Ok(system_root) = std::env::var("SystemRoot") {
                paths.push(PathBuf::from(format!("{}\\System32", system_root)));
            }
        }

        if let Ok(cwd) = std::env::current_dir() {
            paths.insert(0, cwd);
        }

        paths
    }

    /// Candidate file names for `name`, most specific first
    fn candidate_file_names(name: &str) -> Vec<String> {
        let extensions: &[&str] = if cfg!(target_os = "windows") {
            &["dll"]
        } else if cfg!(target_os = "macos") {
            &["dylib", "so"]
        } else {
            &["so"]
        };
        let prefixes: &[&str] = if cfg!(target_os = "windows") {
            &["", "lib"]
        } else {
            &["lib", ""]
        };

        let mut names = Vec::new();
        if name.contains(".so") || name.contains(".dylib") || name.contains(".dll") {
            names.push(name.to_string());
        }
        for prefix in prefixes {
            for ext in extensions {
                let candidate = format!("{}{}.{}", prefix, name, ext);
                if !names.contains(&candidate) {
                    names.push(candidate);
                }
            }
        }
        names
    }

    /// Resolve `name` to an existing file in the search paths
    fn resolve_library_path(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return path.exists().then(|| path.to_path_buf());
        }

        let candidates = Self::candidate_file_names(name);
        self.search_paths.iter().find_map(|dir| {
            candidates
                .iter()
                .map(|file| dir.join(file))
                .find(|full| full.exists())
        })
    }

    /// Load a library by short name, file name or absolute path
    ///
    /// Returns the cached instance when the resolved path was loaded before.
    pub fn load(&mut self, name: &str) -> Result<Arc<Library>, LoadError> {
        let path = self
            .resolve_library_path(name)
            .ok_or_else(|| LoadError::LibraryNotFound(name.to_string()))?;

        if let Some(library) = self.loaded.get(&path) {
            return Ok(Arc::clone(library));
        }

        let library =
            unsafe { Library::new(&path).map_err(|e| LoadError::LoadFailed(e.to_string()))? };
        let library = Arc::new(library);
        tracing::debug!(
            target: "osslbind::native",
            path = %path.display(),
            "loaded native library"
        );
        self.loaded.insert(path, Arc::clone(&library));
        Ok(library)
    }

    /// Load the first of `names` that resolves, returning it with the name used
    pub fn load_first(&mut self, names: &[String]) -> Result<(Arc<Library>, String), LoadError> {
        let mut last_error = LoadError::LibraryNotFound(names.join(", "));
        for name in names {
            match self.load(name) {
                Ok(library) => return Ok((library, name.clone())),
                Err(err @ LoadError::LoadFailed(_)) => last_error = err,
                Err(_) => {}
            }
        }
        Err(last_error)
    }

    /// Add a custom search path, ahead of the defaults
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.insert(0, path);
    }

    /// Number of distinct libraries loaded
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy a function pointer (or other `Copy` symbol) out of `library`
///
/// # Safety
///
/// `T` must match the symbol's real type, and the returned value must not be
/// used after `library` is unloaded.
pub unsafe fn symbol<T: Copy>(
    library: &Library,
    library_name: &str,
    name: &str,
) -> Result<T, LoadError> {
    library
        .get::<T>(name.as_bytes())
        .map(|sym| *sym)
        .map_err(|_| LoadError::SymbolNotFound {
            library: library_name.to_string(),
            symbol: name.to_string(),
        })
}
