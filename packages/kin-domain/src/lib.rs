pub mod consolidation;
pub mod contact;
pub mod observation;
pub mod view;
