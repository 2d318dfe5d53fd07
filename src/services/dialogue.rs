use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::models::{ExtractedEntities, PendingState, RequiredAction, ToolRequest};
use crate::services::oracle;
use crate::services::tools::{self, Tool, ToolOutcome};
use crate::state::AppState;

pub const REPLY_AI_UNAVAILABLE: &str =
    "Desculpe, a inteligência artificial não está disponível no momento.";
pub const REPLY_INVALID_FORMAT: &str =
    "Desculpe, a resposta da IA veio em um formato inválido.";
pub const REPLY_UNKNOWN_TOOL: &str =
    "Desculpe, a IA pediu uma ferramenta que eu não conheço.";
pub const REPLY_RAG_FAILURE: &str =
    "Desculpe, tive um problema ao processar sua solicitação após consultar os dados.";
pub const REPLY_INTERNAL_ERROR: &str =
    "Desculpe, ocorreu um erro interno grave ao processar sua mensagem.";

/// Per-conversation turn serialization. Two near-simultaneous messages from
/// the same user must not interleave their reads and writes of the pending
/// state; distinct conversations proceed concurrently.
#[derive(Default)]
pub struct TurnLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_key(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        Arc::clone(map.entry(key.to_string()).or_default())
    }

    /// Drops locks no in-flight turn holds. An active turn keeps a clone of
    /// the `Arc`, so a strong count of one means only the map remembers it.
    /// Called from the same periodic task that sweeps conversation memory.
    pub fn sweep(&self) -> usize {
        let mut map = self.inner.lock().unwrap();
        let before = map.len();
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - map.len()
    }
}

/// Primary entry point: one inbound message, at most one reply. `Err` means
/// an unexpected internal fault; callers log it and show the generic
/// apology. Every anticipated failure comes back as `Ok` with one of the
/// fixed fallback replies above.
pub async fn process_message(
    state: &Arc<AppState>,
    conversation_id: &str,
    text: &str,
) -> anyhow::Result<String> {
    let turn_lock = state.turns.for_key(conversation_id);
    let _turn = turn_lock.lock().await;

    run_turn(state, conversation_id, text).await
}

async fn run_turn(
    state: &Arc<AppState>,
    conversation_id: &str,
    text: &str,
) -> anyhow::Result<String> {
    // Step 1: context augmentation. One-shot states are consumed here.
    let pending = state.memory.begin_turn(conversation_id);
    if let Some(p) = &pending {
        tracing::debug!(
            conversation = %conversation_id,
            state = p.as_str(),
            "pending state found"
        );
    }
    let augmented = augment(text, pending.as_ref());

    // Step 2: first Oracle round.
    let first_raw = match state.llm.chat(&oracle::first_round(&augmented)).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(error = %e, conversation = %conversation_id, "oracle call failed");
            return Ok(REPLY_AI_UNAVAILABLE.to_string());
        }
    };

    let reply = match oracle::parse_reply(&first_raw) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, raw = %first_raw, "oracle reply unparseable");
            return Ok(REPLY_INVALID_FORMAT.to_string());
        }
    };

    tracing::info!(
        conversation = %conversation_id,
        intent = reply.intencao_detectada.as_deref().unwrap_or("-"),
        action = reply.acao_requerida.as_deref().unwrap_or("-"),
        "processing turn"
    );

    match reply.action() {
        RequiredAction::Respond => {
            // A respond action with no text is malformed output; an empty
            // message must never reach a channel.
            let Some(text) = reply.user_reply().filter(|t| !t.trim().is_empty()) else {
                tracing::error!(conversation = %conversation_id, "oracle responded without text");
                return Ok(REPLY_INVALID_FORMAT.to_string());
            };
            let text = text.to_string();
            apply_choice_transition(state, conversation_id, pending.as_ref(), &reply.entidades_extraidas);
            Ok(text)
        }

        RequiredAction::ExecuteTool => {
            let request = reply.payload_acao.ferramenta_solicitada.unwrap_or_default();
            execute_tool(state, conversation_id, &augmented, &first_raw, request).await
        }

        RequiredAction::Other => {
            let action = reply.acao_requerida.as_deref().unwrap_or("nenhuma");
            tracing::warn!(action = %action, "oracle returned unknown action");
            Ok(format!(
                "Desculpe, recebi uma ação desconhecida ({action}) e não sei o que fazer."
            ))
        }
    }
}

/// Step 3a: an Oracle reply that merely restates the user's chosen id still
/// advances the flow. The Oracle never manages memory; this is where a
/// pending choice plus a freshly extracted id becomes the next state.
fn apply_choice_transition(
    state: &Arc<AppState>,
    conversation_id: &str,
    pending: Option<&PendingState>,
    entities: &ExtractedEntities,
) {
    match pending {
        Some(PendingState::AwaitingSlotChoice { .. }) => {
            if let Some(horario_id) = entities.horario_id {
                tracing::debug!(conversation = %conversation_id, horario_id, "slot chosen, awaiting name");
                state
                    .memory
                    .set(conversation_id, PendingState::AwaitingName { horario_id });
            }
        }
        Some(PendingState::AwaitingExamSlotChoice { tipo_exame, .. }) => {
            if let Some(horario_exame_id) = entities.horario_exame_id {
                tracing::debug!(
                    conversation = %conversation_id,
                    horario_exame_id,
                    "exam slot chosen, awaiting name"
                );
                state.memory.set(
                    conversation_id,
                    PendingState::AwaitingNameForExam {
                        horario_exame_id,
                        tipo_exame: tipo_exame.clone(),
                    },
                );
            }
        }
        _ => {}
    }
}

/// Step 3b: validate, inject the conversation id, dispatch, set the next
/// pending state, then the second (RAG) Oracle round.
async fn execute_tool(
    state: &Arc<AppState>,
    conversation_id: &str,
    augmented: &str,
    first_raw: &str,
    request: ToolRequest,
) -> anyhow::Result<String> {
    let Some(tool) = request.nome.as_deref().and_then(Tool::from_wire) else {
        tracing::error!(tool = ?request.nome, "oracle requested unknown tool");
        return Ok(REPLY_UNKNOWN_TOOL.to_string());
    };

    let mut params = request.parametros;
    if tool.needs_conversation_id() {
        params.insert(
            "conversation_id".to_string(),
            Value::String(conversation_id.to_string()),
        );
    }

    tracing::info!(conversation = %conversation_id, tool = tool.wire_name(), "executing tool");
    let outcome = tools::dispatch(&state.db, tool, &params);

    set_post_tool_state(state, conversation_id, tool, &outcome, &params);

    let rag_messages = oracle::rag_round(augmented, first_raw, tool.wire_name(), outcome.text());
    let second_raw = match state.llm.chat(&rag_messages).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(error = %e, conversation = %conversation_id, "oracle RAG call failed");
            return Ok(REPLY_AI_UNAVAILABLE.to_string());
        }
    };

    let second = match oracle::parse_reply(&second_raw) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, raw = %second_raw, "oracle RAG reply unparseable");
            return Ok(REPLY_RAG_FAILURE.to_string());
        }
    };

    if second.action() != RequiredAction::Respond {
        tracing::error!(
            action = second.acao_requerida.as_deref().unwrap_or("-"),
            "oracle did not respond after tool result"
        );
        return Ok(REPLY_RAG_FAILURE.to_string());
    }

    match second.user_reply().filter(|t| !t.trim().is_empty()) {
        Some(text) => Ok(text.to_string()),
        None => {
            tracing::error!(conversation = %conversation_id, "oracle RAG response carried no text");
            Ok(REPLY_RAG_FAILURE.to_string())
        }
    }
}

/// Which tools leave a pending choice behind. List tools skip the state
/// when there was nothing to choose from; booking and cancellation tools
/// end their flow and leave nothing.
fn set_post_tool_state(
    state: &Arc<AppState>,
    conversation_id: &str,
    tool: Tool,
    outcome: &ToolOutcome,
    params: &serde_json::Map<String, Value>,
) {
    let shown = outcome.text().to_string();
    let next = match tool {
        // The slot query pins the choice state even on an empty listing;
        // the user is mid-booking either way.
        Tool::ConsultationSlots if !matches!(outcome, ToolOutcome::DomainError(_)) => {
            Some(PendingState::AwaitingSlotChoice { shown })
        }
        Tool::OwnConsultations if outcome.is_success() => {
            Some(PendingState::AwaitingCancellationChoice { shown })
        }
        Tool::ExamTypes if outcome.is_success() => Some(PendingState::AwaitingExamType { shown }),
        Tool::ExamSlots if outcome.is_success() => {
            let tipo_exame = params
                .get("tipo_exame")
                .and_then(|v| v.as_str())
                .unwrap_or("Desconhecido")
                .to_string();
            Some(PendingState::AwaitingExamSlotChoice { shown, tipo_exame })
        }
        Tool::OwnExamBookings if outcome.is_success() => {
            Some(PendingState::AwaitingExamCancellationChoice { shown })
        }
        _ => None,
    };

    if let Some(next) = next {
        tracing::debug!(conversation = %conversation_id, state = next.as_str(), "pending state set");
        state.memory.set(conversation_id, next);
    }
}

/// Rewrites the user text so the Oracle sees the remembered context and the
/// new utterance as one message.
fn augment(text: &str, pending: Option<&PendingState>) -> String {
    let Some(pending) = pending else {
        return text.to_string();
    };

    match pending {
        PendingState::AwaitingSlotChoice { shown } => format!(
            "[CONTEXTO: O usuário está escolhendo um ID da lista de horários de consulta que \
             você acabou de mostrar: '{shown}'.] MENSAGEM DO USUÁRIO: {text}"
        ),
        PendingState::AwaitingName { horario_id } => format!(
            "[CONTEXTO: O usuário já escolheu o horario_id de consulta: {horario_id}. Esta \
             mensagem é o NOME dele para o agendamento.] MENSAGEM DO USUÁRIO: {text}"
        ),
        PendingState::AwaitingCancellationChoice { shown } => format!(
            "[CONTEXTO: O usuário está escolhendo um ID da lista de agendamentos para cancelar \
             que você acabou de mostrar: '{shown}'.] MENSAGEM DO USUÁRIO: {text}"
        ),
        PendingState::AwaitingExamType { shown } => format!(
            "[CONTEXTO: O usuário está escolhendo um tipo de exame da lista que você acabou de \
             mostrar: '{shown}'.] MENSAGEM DO USUÁRIO: {text}"
        ),
        PendingState::AwaitingExamSlotChoice { shown, tipo_exame } => format!(
            "[CONTEXTO: O usuário já escolheu o tipo de exame '{tipo_exame}' e está escolhendo \
             um ID da lista de horários de exame que você mostrou: '{shown}'.] MENSAGEM DO \
             USUÁRIO: {text}"
        ),
        PendingState::AwaitingNameForExam {
            horario_exame_id,
            tipo_exame,
        } => format!(
            "[CONTEXTO: O usuário já escolheu o tipo de exame '{tipo_exame}' e o \
             horario_exame_id: {horario_exame_id}. Esta mensagem é o NOME dele para o \
             agendamento do exame.] MENSAGEM DO USUÁRIO: {text}"
        ),
        PendingState::AwaitingExamCancellationChoice { shown } => format!(
            "[CONTEXTO: O usuário está escolhendo um ID da lista de agendamentos de EXAME para \
             cancelar que você acabou de mostrar: '{shown}'.] MENSAGEM DO USUÁRIO: {text}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_augment_without_state_is_identity() {
        assert_eq!(augment("oi", None), "oi");
    }

    #[test]
    fn test_turn_lock_sweep_keeps_only_held_locks() {
        let locks = TurnLocks::new();
        let held = locks.for_key("chat-1");
        let _ = locks.for_key("chat-2");

        // chat-2's lock is idle and goes; chat-1's is held and stays.
        assert_eq!(locks.sweep(), 1);
        assert_eq!(locks.sweep(), 0);

        drop(held);
        assert_eq!(locks.sweep(), 1);
    }

    #[test]
    fn test_turn_lock_reissued_after_sweep() {
        let locks = TurnLocks::new();
        let _ = locks.for_key("chat-1");
        locks.sweep();
        // A swept key is simply re-created on the next turn.
        let lock = locks.for_key("chat-1");
        assert!(lock.try_lock().is_ok());
    }

    #[test]
    fn test_augment_awaiting_name_carries_slot_id() {
        let augmented = augment(
            "Norian Henrique",
            Some(&PendingState::AwaitingName { horario_id: 1 }),
        );
        assert!(augmented.contains("horario_id de consulta: 1"));
        assert!(augmented.ends_with("MENSAGEM DO USUÁRIO: Norian Henrique"));
    }

    #[test]
    fn test_augment_exam_slot_choice_carries_type_and_list() {
        let augmented = augment(
            "ID 2",
            Some(&PendingState::AwaitingExamSlotChoice {
                shown: "[ID 2: 2030-11-26 07:30:00]".to_string(),
                tipo_exame: "Exame de Sangue".to_string(),
            }),
        );
        assert!(augmented.contains("'Exame de Sangue'"));
        assert!(augmented.contains("[ID 2: 2030-11-26 07:30:00]"));
    }
}
