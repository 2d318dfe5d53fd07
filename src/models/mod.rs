pub mod memory;
pub mod oracle;
pub mod scheduling;

pub use memory::PendingState;
pub use oracle::{ActionPayload, ExtractedEntities, OracleReply, RequiredAction, ToolRequest};
pub use scheduling::{
    AvailableSlot, BookOutcome, CancelOutcome, ExamSlotRow, OwnBooking, OwnExamBooking,
};
