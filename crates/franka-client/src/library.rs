//! 模型库加载
//!
//! 按名称加载外部数值/模型动态库并查找符号。会话本身不依赖模型库，
//! 这里只负责把平台加载器的失败归类为 `LibraryError`。

use std::ffi::c_void;
use thiserror::Error;

/// 模型库错误，均携带平台加载器给出的诊断信息
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("model library already loaded")]
    AlreadyLoaded,
    #[error("symbol cannot be found: {0}")]
    SymbolNotFound(String),
    #[error("cannot load model library: {0}")]
    LoadFailed(String),
    #[error("error while fetching symbols: {0}")]
    FetchFailed(String),
}

/// 模型库提供者
pub trait LibraryProvider {
    /// 按名称加载（实现负责追加平台后缀）
    fn load(&mut self, name: &str) -> Result<(), LibraryError>;

    /// 查找符号地址
    fn symbol(&self, name: &str) -> Result<*mut c_void, LibraryError>;
}

/// 基于 `dlopen` / `dlsym` 的加载器
///
/// 每个加载器至多持有一个库，drop 时卸载（忽略卸载错误）。
#[derive(Debug, Default)]
pub struct LibraryLoader {
    handle: Option<std::ptr::NonNull<c_void>>,
    path: Option<String>,
}

impl LibraryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建加载器并加载 `name` + 平台后缀
    pub fn open(name: &str) -> Result<Self, LibraryError> {
        let mut loader = Self::new();
        loader.load(name)?;
        Ok(loader)
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// 已加载库的路径
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// 按完整路径加载（不追加后缀）
    pub fn load_path(&mut self, path: &str) -> Result<(), LibraryError> {
        if self.handle.is_some() {
            return Err(LibraryError::AlreadyLoaded);
        }

        let handle = sys::open(path)?;
        tracing::debug!("Model library loaded: {}", path);
        self.handle = Some(handle);
        self.path = Some(path.to_string());
        Ok(())
    }
}

impl LibraryProvider for LibraryLoader {
    fn load(&mut self, name: &str) -> Result<(), LibraryError> {
        let path = format!("{}{}", name, std::env::consts::DLL_SUFFIX);
        self.load_path(&path)
    }

    fn symbol(&self, name: &str) -> Result<*mut c_void, LibraryError> {
        let handle = self
            .handle
            .ok_or_else(|| LibraryError::FetchFailed("no model library loaded".to_string()))?;
        sys::symbol(handle, name)
    }
}

impl Drop for LibraryLoader {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            sys::close(handle);
            tracing::debug!("Model library unloaded: {:?}", self.path);
        }
    }
}

#[cfg(unix)]
mod sys {
    use super::LibraryError;
    use std::ffi::{CStr, CString, c_void};
    use std::ptr::NonNull;

    fn last_error() -> String {
        // SAFETY: dlerror 返回线程局部的 C 字符串或 NULL
        let message = unsafe { libc::dlerror() };
        if message.is_null() {
            "unknown error".to_string()
        } else {
            // SAFETY: 非 NULL 时指向以 NUL 结尾的字符串，在下一次 dl* 调用前有效
            unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
        }
    }

    pub(super) fn open(path: &str) -> Result<NonNull<c_void>, LibraryError> {
        let c_path = CString::new(path)
            .map_err(|_| LibraryError::LoadFailed(format!("{}: path contains NUL", path)))?;

        // SAFETY: c_path 在调用期间有效
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        NonNull::new(handle).ok_or_else(|| LibraryError::LoadFailed(last_error()))
    }

    pub(super) fn symbol(handle: NonNull<c_void>, name: &str) -> Result<*mut c_void, LibraryError> {
        let c_name = CString::new(name)
            .map_err(|_| LibraryError::FetchFailed(format!("{}: name contains NUL", name)))?;

        // SAFETY: handle 来自成功的 dlopen 且尚未关闭
        unsafe {
            libc::dlerror();
            let address = libc::dlsym(handle.as_ptr(), c_name.as_ptr());
            if address.is_null() {
                return Err(LibraryError::SymbolNotFound(format!("{}: {}", name, last_error())));
            }
            Ok(address)
        }
    }

    pub(super) fn close(handle: NonNull<c_void>) {
        // SAFETY: handle 来自成功的 dlopen，只关闭一次
        let _ = unsafe { libc::dlclose(handle.as_ptr()) };
    }
}

#[cfg(not(unix))]
mod sys {
    use super::LibraryError;
    use std::ffi::c_void;
    use std::ptr::NonNull;

    pub(super) fn open(path: &str) -> Result<NonNull<c_void>, LibraryError> {
        Err(LibraryError::LoadFailed(format!(
            "{}: dynamic loading is not supported on this platform",
            path
        )))
    }

    pub(super) fn symbol(_handle: NonNull<c_void>, name: &str) -> Result<*mut c_void, LibraryError> {
        Err(LibraryError::FetchFailed(name.to_string()))
    }

    pub(super) fn close(_handle: NonNull<c_void>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            LibraryError::AlreadyLoaded.to_string(),
            "model library already loaded"
        );
        assert_eq!(
            LibraryError::SymbolNotFound("forward".into()).to_string(),
            "symbol cannot be found: forward"
        );
    }

    #[test]
    fn test_symbol_without_library() {
        let loader = LibraryLoader::new();
        assert!(matches!(
            loader.symbol("anything"),
            Err(LibraryError::FetchFailed(_))
        ));
    }

    #[test]
    fn test_missing_library_appends_suffix() {
        let mut loader = LibraryLoader::new();
        let err = loader.load("franka_no_such_model_library").unwrap_err();
        match err {
            LibraryError::LoadFailed(message) => {
                assert!(message.contains(&format!(
                    "franka_no_such_model_library{}",
                    std::env::consts::DLL_SUFFIX
                )));
            },
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!loader.is_loaded());
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_load_system_library() {
        let mut loader = LibraryLoader::new();
        loader.load_path("libc.so.6").unwrap();
        assert!(loader.is_loaded());
        assert!(!loader.symbol("strlen").unwrap().is_null());

        assert!(matches!(
            loader.symbol("franka_definitely_missing_symbol"),
            Err(LibraryError::SymbolNotFound(_))
        ));
        assert_eq!(loader.load_path("libc.so.6"), Err(LibraryError::AlreadyLoaded));
    }
}
