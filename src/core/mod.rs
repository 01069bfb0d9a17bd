pub mod checkpoint;
pub mod comparator;
pub mod control;
pub mod drive_sync;
pub mod engine;
pub mod events;
pub mod fingerprint;
pub mod manifest;
pub mod notes;
pub mod preset;
pub mod statistics;
pub mod transfer;

pub use checkpoint::{CheckpointStore, ResumeCheckpoint};
pub use comparator::{
    classify_by_file_count, compare_fingerprints, ClassifiedEvents, ComparedEvent, DiffClassifier,
    EventRelation, EventStatus,
};
pub use control::SyncControl;
pub use drive_sync::{ComparisonResult, DriveSync, StartSyncOptions};
pub use engine::{
    EventError, SyncEngine, SyncMode, SyncReport, SyncRequest, SyncState, SyncStatus,
};
pub use events::{EventBus, SyncEvent, SyncProgress};
pub use fingerprint::{EventFingerprinter, FileEntry, Fingerprint};
pub use manifest::{SyncManifest, MANIFEST_FILE};
pub use notes::{
    merge_notes, notes_key, AnnotationStore, EventNotes, MemoryNotesStore, NoteDiff,
    NotesComparison, NotesDiff,
};
pub use preset::{Preset, PresetPatch, PresetStore};
pub use statistics::{
    DetailColumn, DetailRow, DetailTable, SortDirection, Statistics, StatisticsAggregator,
};
pub use transfer::{copy_event, copy_file, verify_event, verify_file, USERDATA_FILE};
