//! Storage module for mempool records and templates

pub mod persistence;

pub use persistence::{
    decode_record, load_mempool, load_record, load_template, record_paths, save_template,
    StorageError, TemplateFile, RECORD_EXTENSION,
};
