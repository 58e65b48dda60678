//! Column family definitions for RocksDB.
//!
//! - documents: every collection's documents, keyed `<collection>\0<id>`
//! - index_specs: registered secondary indexes per collection
//! - index_entries: secondary index entries (keys only)
//! - job_runs: last run record per rollup job

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for documents of all collections
pub const CF_DOCUMENTS: &str = "documents";

/// Column family name for index definitions
pub const CF_INDEX_SPECS: &str = "index_specs";

/// Column family name for index entries
pub const CF_INDEX_ENTRIES: &str = "index_entries";

/// Column family name for job run records
pub const CF_JOB_RUNS: &str = "job_runs";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_DOCUMENTS, CF_INDEX_SPECS, CF_INDEX_ENTRIES, CF_JOB_RUNS];

/// Documents are rewritten wholesale by every rollup run; compress them.
fn documents_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Index entries are short keys with empty values and are range-scanned by prefix.
fn index_entries_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_DOCUMENTS, documents_options()),
        ColumnFamilyDescriptor::new(CF_INDEX_SPECS, Options::default()),
        ColumnFamilyDescriptor::new(CF_INDEX_ENTRIES, index_entries_options()),
        ColumnFamilyDescriptor::new(CF_JOB_RUNS, Options::default()),
    ]
}
