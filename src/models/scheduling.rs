/// An open consultation slot joined with its staff member.
#[derive(Debug, Clone)]
pub struct AvailableSlot {
    pub id: i64,
    pub staff_name: String,
    pub start_datetime: String,
}

/// A confirmed future consultation booking owned by one conversation.
#[derive(Debug, Clone)]
pub struct OwnBooking {
    pub id: i64,
    pub staff_name: String,
    pub start_datetime: String,
}

/// An open exam slot for one exam type.
#[derive(Debug, Clone)]
pub struct ExamSlotRow {
    pub id: i64,
    pub start_datetime: String,
}

/// A confirmed future exam booking owned by one conversation.
#[derive(Debug, Clone)]
pub struct OwnExamBooking {
    pub id: i64,
    pub exam_name: String,
    pub start_datetime: String,
}

/// Result of the atomic check-then-book sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum BookOutcome {
    Booked,
    SlotMissing,
    SlotTaken,
}

/// Result of the atomic ownership-scoped cancellation.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
    WrongStatus(String),
}
