pub type Result<T> = std::result::Result<T, bx_core::SyncError>;
