//! Delivery note domain module.
//!
//! A delivery note (bon de livraison) is the immutable record of materials handed
//! over. Notes are plain entities: created once by fulfilment, afterwards only
//! their status may change.

pub mod note;

pub use note::{DeliveryNote, DeliveryNoteId, DeliveryNoteLine, DeliveryNoteStatus, NewDeliveryNote};
