pub mod backup;
pub mod export;
pub mod files;
pub mod status;
