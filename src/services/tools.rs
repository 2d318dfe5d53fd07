use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::db::queries;
use crate::models::oracle::coerce_id;
use crate::models::{BookOutcome, CancelOutcome};

/// The closed set of operations the Oracle may request. Unknown wire names
/// never make it past `from_wire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    ClinicInfo,
    ConsultationSlots,
    BookConsultation,
    OwnConsultations,
    CancelConsultation,
    ExamTypes,
    ExamSlots,
    BookExam,
    OwnExamBookings,
    CancelExam,
}

impl Tool {
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "tool_obter_info_clinica" => Some(Tool::ClinicInfo),
            "tool_consultar_horarios_disponiveis" => Some(Tool::ConsultationSlots),
            "tool_marcar_agendamento" => Some(Tool::BookConsultation),
            "tool_listar_meus_agendamentos" => Some(Tool::OwnConsultations),
            "tool_cancelar_agendamento" => Some(Tool::CancelConsultation),
            "tool_consultar_exames_disponiveis" => Some(Tool::ExamTypes),
            "tool_consultar_horarios_exames" => Some(Tool::ExamSlots),
            "tool_marcar_exame" => Some(Tool::BookExam),
            "tool_listar_meus_exames_agendados" => Some(Tool::OwnExamBookings),
            "tool_cancelar_exame" => Some(Tool::CancelExam),
            _ => None,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            Tool::ClinicInfo => "tool_obter_info_clinica",
            Tool::ConsultationSlots => "tool_consultar_horarios_disponiveis",
            Tool::BookConsultation => "tool_marcar_agendamento",
            Tool::OwnConsultations => "tool_listar_meus_agendamentos",
            Tool::CancelConsultation => "tool_cancelar_agendamento",
            Tool::ExamTypes => "tool_consultar_exames_disponiveis",
            Tool::ExamSlots => "tool_consultar_horarios_exames",
            Tool::BookExam => "tool_marcar_exame",
            Tool::OwnExamBookings => "tool_listar_meus_exames_agendados",
            Tool::CancelExam => "tool_cancelar_exame",
        }
    }

    /// Whether the dialogue engine must inject the caller's conversation id
    /// before dispatch. Every tool that touches bookings needs it; a new
    /// variant forces this match to be revisited.
    pub fn needs_conversation_id(&self) -> bool {
        match self {
            Tool::BookConsultation
            | Tool::OwnConsultations
            | Tool::CancelConsultation
            | Tool::BookExam
            | Tool::OwnExamBookings
            | Tool::CancelExam => true,
            Tool::ClinicInfo | Tool::ConsultationSlots | Tool::ExamTypes | Tool::ExamSlots => {
                false
            }
        }
    }
}

/// Every tool result, tagged. The display string is shown to the user (via
/// the RAG round) either way; the tag is what the dialogue engine branches
/// on, so no downstream code matches sentinel substrings.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(String),
    Empty(String),
    DomainError(String),
}

impl ToolOutcome {
    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Success(text)
            | ToolOutcome::Empty(text)
            | ToolOutcome::DomainError(text) => text,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }
}

/// Runs one tool. Never fails past this boundary: database faults are
/// logged and come back as a generic domain-error string for the RAG round
/// to narrate.
pub fn dispatch(db: &Arc<Mutex<Connection>>, tool: Tool, params: &Map<String, Value>) -> ToolOutcome {
    let result = {
        let mut conn = db.lock().unwrap();
        run(&mut conn, tool, params)
    };

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, tool = tool.wire_name(), "tool execution failed");
            ToolOutcome::DomainError("Ocorreu um erro ao consultar o banco de dados.".to_string())
        }
    }
}

fn run(conn: &mut Connection, tool: Tool, params: &Map<String, Value>) -> anyhow::Result<ToolOutcome> {
    match tool {
        Tool::ClinicInfo => {
            let Some(topic) = param_str(params, "topic") else {
                return Ok(ToolOutcome::DomainError("Tópico não fornecido.".to_string()));
            };
            match queries::get_info(conn, &topic)? {
                Some(value) => Ok(ToolOutcome::Success(value)),
                None => Ok(ToolOutcome::Empty(format!(
                    "Informação sobre '{topic}' não encontrada."
                ))),
            }
        }

        Tool::ConsultationSlots => {
            let Some(specialty) = param_str(params, "especialidade") else {
                return Ok(ToolOutcome::DomainError(
                    "Erro: especialidade não informada.".to_string(),
                ));
            };
            let slots = queries::list_available_slots(conn, &specialty)?;
            if slots.is_empty() {
                return Ok(ToolOutcome::Empty(
                    "Desculpe, não encontramos horários disponíveis para esta especialidade no momento."
                        .to_string(),
                ));
            }
            let listing = slots
                .iter()
                .map(|s| format!("[ID {}: {} - {}]", s.id, s.staff_name, s.start_datetime))
                .collect::<Vec<_>>()
                .join("; ");
            Ok(ToolOutcome::Success(listing))
        }

        Tool::BookConsultation => {
            let (Some(slot_id), Some(patient), Some(conversation_id)) = (
                param_id(params, "horario_id"),
                param_str(params, "nome_paciente"),
                param_str(params, "conversation_id"),
            ) else {
                return Ok(ToolOutcome::DomainError(
                    "Erro: dados incompletos para o agendamento (horario_id e nome_paciente são obrigatórios)."
                        .to_string(),
                ));
            };
            match queries::book_consultation(conn, slot_id, &patient, &conversation_id)? {
                BookOutcome::Booked => Ok(ToolOutcome::Success(
                    "Agendamento confirmado com sucesso!".to_string(),
                )),
                BookOutcome::SlotMissing => Ok(ToolOutcome::DomainError(format!(
                    "Erro: o horário com ID {slot_id} não existe."
                ))),
                BookOutcome::SlotTaken => Ok(ToolOutcome::DomainError(
                    "Desculpe, este horário não está mais disponível.".to_string(),
                )),
            }
        }

        Tool::OwnConsultations => {
            let Some(conversation_id) = param_str(params, "conversation_id") else {
                return Ok(ToolOutcome::DomainError(
                    "Erro: identificação da conversa ausente.".to_string(),
                ));
            };
            let bookings =
                queries::list_own_bookings(conn, &conversation_id, &queries::now_string())?;
            if bookings.is_empty() {
                return Ok(ToolOutcome::Empty(
                    "Você não possui agendamentos futuros confirmados.".to_string(),
                ));
            }
            let listing = bookings
                .iter()
                .map(|b| format!("[ID {}: {} - {}]", b.id, b.staff_name, b.start_datetime))
                .collect::<Vec<_>>()
                .join("; ");
            Ok(ToolOutcome::Success(listing))
        }

        Tool::CancelConsultation => {
            let (Some(booking_id), Some(conversation_id)) = (
                param_id(params, "agendamento_id"),
                param_str(params, "conversation_id"),
            ) else {
                return Ok(ToolOutcome::DomainError(
                    "Erro: agendamento_id é obrigatório para o cancelamento.".to_string(),
                ));
            };
            match queries::cancel_consultation(conn, booking_id, &conversation_id)? {
                CancelOutcome::Cancelled => Ok(ToolOutcome::Success(
                    "Agendamento cancelado com sucesso!".to_string(),
                )),
                CancelOutcome::NotFound => Ok(ToolOutcome::DomainError(
                    "Erro: agendamento não encontrado ou não pertence a você.".to_string(),
                )),
                CancelOutcome::WrongStatus(status) => Ok(ToolOutcome::DomainError(format!(
                    "Erro: este agendamento não pode ser cancelado (status atual: {status})."
                ))),
            }
        }

        Tool::ExamTypes => {
            let names = queries::list_exam_types(conn)?;
            if names.is_empty() {
                return Ok(ToolOutcome::Empty(
                    "Não há tipos de exames cadastrados no momento.".to_string(),
                ));
            }
            Ok(ToolOutcome::Success(names.join("; ")))
        }

        Tool::ExamSlots => {
            let Some(exam_type) = param_str(params, "tipo_exame") else {
                return Ok(ToolOutcome::DomainError(
                    "Erro: tipo de exame não informado.".to_string(),
                ));
            };
            let slots = queries::list_exam_slots(conn, &exam_type)?;
            if slots.is_empty() {
                return Ok(ToolOutcome::Empty(
                    "Desculpe, não encontramos horários disponíveis para este exame no momento."
                        .to_string(),
                ));
            }
            let listing = slots
                .iter()
                .map(|s| format!("[ID {}: {}]", s.id, s.start_datetime))
                .collect::<Vec<_>>()
                .join("; ");
            Ok(ToolOutcome::Success(listing))
        }

        Tool::BookExam => {
            let (Some(exam_slot_id), Some(patient), Some(conversation_id)) = (
                param_id(params, "horario_exame_id"),
                param_str(params, "nome_paciente"),
                param_str(params, "conversation_id"),
            ) else {
                return Ok(ToolOutcome::DomainError(
                    "Erro: dados incompletos para o agendamento do exame (horario_exame_id e nome_paciente são obrigatórios)."
                        .to_string(),
                ));
            };
            match queries::book_exam(conn, exam_slot_id, &patient, &conversation_id)? {
                BookOutcome::Booked => Ok(ToolOutcome::Success(
                    "Agendamento de exame confirmado com sucesso!".to_string(),
                )),
                BookOutcome::SlotMissing => Ok(ToolOutcome::DomainError(format!(
                    "Erro: o horário de exame com ID {exam_slot_id} não existe."
                ))),
                BookOutcome::SlotTaken => Ok(ToolOutcome::DomainError(
                    "Desculpe, este horário de exame não está mais disponível.".to_string(),
                )),
            }
        }

        Tool::OwnExamBookings => {
            let Some(conversation_id) = param_str(params, "conversation_id") else {
                return Ok(ToolOutcome::DomainError(
                    "Erro: identificação da conversa ausente.".to_string(),
                ));
            };
            let bookings =
                queries::list_own_exam_bookings(conn, &conversation_id, &queries::now_string())?;
            if bookings.is_empty() {
                return Ok(ToolOutcome::Empty(
                    "Você não possui agendamentos de exames futuros confirmados.".to_string(),
                ));
            }
            let listing = bookings
                .iter()
                .map(|b| format!("[ID {}: {} - {}]", b.id, b.exam_name, b.start_datetime))
                .collect::<Vec<_>>()
                .join("; ");
            Ok(ToolOutcome::Success(listing))
        }

        Tool::CancelExam => {
            let (Some(exam_booking_id), Some(conversation_id)) = (
                param_id(params, "agendamento_exame_id"),
                param_str(params, "conversation_id"),
            ) else {
                return Ok(ToolOutcome::DomainError(
                    "Erro: agendamento_exame_id é obrigatório para o cancelamento.".to_string(),
                ));
            };
            match queries::cancel_exam(conn, exam_booking_id, &conversation_id)? {
                CancelOutcome::Cancelled => Ok(ToolOutcome::Success(
                    "Agendamento de exame cancelado com sucesso!".to_string(),
                )),
                CancelOutcome::NotFound => Ok(ToolOutcome::DomainError(
                    "Erro: agendamento de exame não encontrado ou não pertence a você.".to_string(),
                )),
                CancelOutcome::WrongStatus(status) => Ok(ToolOutcome::DomainError(format!(
                    "Erro: este agendamento de exame não pode ser cancelado (status atual: {status})."
                ))),
            }
        }
    }
}

fn param_str(params: &Map<String, Value>, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn param_id(params: &Map<String, Value>, key: &str) -> Option<i64> {
    params.get(key).and_then(coerce_id)
}
