pub mod anchor_record;

pub use anchor_record::AnchorRecord;
