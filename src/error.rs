use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("page address {0:#010x} is not a multiple of the page size")]
    AddressInvalid(u32),
    #[error("type tag {0:#06x} is reserved")]
    ReservedType(u16),
    #[error("neither the primary nor the bank page holds a reachable terminator")]
    Unrecoverable,
    #[error("rebuilt page image exceeds the page size")]
    PageOverflow,
}

impl StoreError {
    /// Fatal errors signal corrupted or overcommitted persistent state.
    /// The embedding firmware must halt on them; continuing with a
    /// malformed page risks bricking the device on the next boot.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unrecoverable | StoreError::PageOverflow)
    }
}

pub type Result<T> = core::result::Result<T, StoreError>;
