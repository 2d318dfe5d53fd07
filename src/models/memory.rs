/// Pending multi-step flow for one conversation. At most one exists per
/// conversation id; setting a new one overwrites the old.
///
/// One-shot states describe a single expected next message (a name, a
/// cancellation id) and are consumed when read. The choice-list states
/// persist, because the same displayed list may need to be referenced again
/// on the following turn.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingState {
    /// Last reply showed consultation slots; waiting for a slot id.
    AwaitingSlotChoice { shown: String },
    /// A slot id was chosen; the next message is the patient's name.
    AwaitingName { horario_id: i64 },
    /// Last reply showed the user's own bookings; waiting for an id to cancel.
    AwaitingCancellationChoice { shown: String },
    /// Last reply showed exam type names; waiting for a choice.
    AwaitingExamType { shown: String },
    /// Last reply showed exam slots; waiting for a slot id.
    AwaitingExamSlotChoice { shown: String, tipo_exame: String },
    /// An exam slot id was chosen; the next message is the patient's name.
    AwaitingNameForExam {
        horario_exame_id: i64,
        tipo_exame: String,
    },
    /// Last reply showed the user's exam bookings; waiting for an id to cancel.
    AwaitingExamCancellationChoice { shown: String },
}

impl PendingState {
    pub fn is_one_shot(&self) -> bool {
        matches!(
            self,
            PendingState::AwaitingName { .. }
                | PendingState::AwaitingCancellationChoice { .. }
                | PendingState::AwaitingNameForExam { .. }
                | PendingState::AwaitingExamCancellationChoice { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PendingState::AwaitingSlotChoice { .. } => "awaiting_slot_choice",
            PendingState::AwaitingName { .. } => "awaiting_name",
            PendingState::AwaitingCancellationChoice { .. } => "awaiting_cancellation_choice",
            PendingState::AwaitingExamType { .. } => "awaiting_exam_type",
            PendingState::AwaitingExamSlotChoice { .. } => "awaiting_exam_slot_choice",
            PendingState::AwaitingNameForExam { .. } => "awaiting_name_for_exam",
            PendingState::AwaitingExamCancellationChoice { .. } => {
                "awaiting_exam_cancellation_choice"
            }
        }
    }
}
