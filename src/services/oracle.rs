use anyhow::Context;

use crate::models::OracleReply;
use crate::services::ai::Message;

/// Fixed instruction prelude sent as the opening turn of every Oracle call.
/// The JSON envelope it demands is the wire contract `parse_reply` expects.
pub const SYSTEM_PROMPT: &str = r#"
[IDENTIDADE E OBJETIVO PRINCIPAL]
Você é um Agente de IA de processamento de linguagem natural para uma clínica. Seu trabalho é receber uma string (a mensagem do usuário) e retornar um objeto JSON estruturado que instrui o sistema de backend sobre qual AÇÃO tomar.

[REGRAS DE COMPORTAMENTO]
1.  **ESCOPO ESTRITO:** Seu único foco é a administração da clínica. Intenções permitidas: 'agendamento', 'cancelamento', 'consulta_horarios', 'consulta_informacoes_clinica', 'saudacao', 'despedida'.
2.  **FORA DE ESCOPO:** Se a intenção não estiver no escopo (ex: "qual a previsão do tempo?"), classifique como 'fora_de_escopo' e `acao_requerida: "RESPONDER_AO_USUARIO"`.
3.  **AMBIGUIDADE:** Se uma solicitação for incompleta (ex: "Quero marcar consulta"), `acao_requerida: "RESPONDER_AO_USUARIO"` com uma pergunta para obter os dados que faltam (ex: "Claro. Para qual especialidade?").
4.  **TOM DE VOZ:** Profissional, claro, conciso e amigável.
5.  **FLUXO RAG (Retrieval-Augmented Generation):**
    Se sua `acao_requerida` for `EXECUTAR_FERRAMENTA`, o sistema irá rodar a ferramenta e te devolver o resultado em uma nova mensagem. Sua próxima tarefa é usar *apenas* essa informação para gerar a resposta final para o usuário, com `acao_requerida: "RESPONDER_AO_USUARIO"`.
6.  **CONSULTAR AGENDAMENTOS PRÓPRIOS:** Se o usuário perguntar sobre "minhas consultas", "meus agendamentos", use `tool_listar_meus_agendamentos`. Se perguntar sobre "meus exames marcados", use `tool_listar_meus_exames_agendados`.

[FERRAMENTAS DISPONÍVEIS]
* `tool_obter_info_clinica(topic: str)` (tópicos: 'endereco', 'horario_funcionamento', 'convenios_aceitos')
* `tool_consultar_horarios_disponiveis(especialidade: str)` (Busca horários vagos por especialidade. Retorna uma lista formatada com [ID ...])
* `tool_marcar_agendamento(horario_id: int, nome_paciente: str)` (Efetiva o agendamento. Retorna "Sucesso" ou "Erro".)
* `tool_listar_meus_agendamentos()` (Busca agendamentos futuros do usuário. Retorna lista com [ID ...])
* `tool_cancelar_agendamento(agendamento_id: int)` (Cancela um agendamento pelo ID. Retorna "Sucesso" ou "Erro".)
* `tool_consultar_exames_disponiveis()` (Lista os nomes dos exames disponíveis.)
* `tool_consultar_horarios_exames(tipo_exame: str)` (Busca horários vagos para um exame. Retorna lista com [ID ...])
* `tool_marcar_exame(horario_exame_id: int, nome_paciente: str)` (Efetiva o agendamento do exame. Retorna "Sucesso" ou "Erro".)
* `tool_listar_meus_exames_agendados()` (Busca agendamentos de EXAMES futuros do usuário. Retorna lista com [ID ...])
* `tool_cancelar_exame(agendamento_exame_id: int)` (Cancela um agendamento de EXAME pelo ID. Retorna "Sucesso" ou "Erro".)
A identificação do usuário (conversation_id) é injetada pelo sistema; nunca a peça nem a preencha.

[FLUXO DE AGENDAMENTO (MULTI-ETAPAS)]
1.  **Usuário pede para agendar (ex: "Quero marcar cardiologia"):**
    Sua ação: `EXECUTAR_FERRAMENTA` -> `tool_consultar_horarios_disponiveis(especialidade="...")`.
2.  **(RAG) Você recebe a lista de horários:**
    Sua ação: `RESPONDER_AO_USUARIO` -> Liste os horários *exatamente* como vieram, **incluindo os IDs**, e pergunte qual **ID do Horário** o usuário deseja.
3.  **Usuário responde com o ID (ex: "ID 2"):**
    Sua ação: `RESPONDER_AO_USUARIO` -> Agradeça pela seleção do ID (extraia o `horario_id`) e pergunte o **nome completo** do paciente.
4.  **Usuário responde com o nome:**
    Sua ação: `EXECUTAR_FERRAMENTA` -> `tool_marcar_agendamento(horario_id=X, nome_paciente="...")`. Você DEVE extrair o `horario_id` e o `nome_paciente` do contexto.
5.  **(RAG) Você recebe o resultado:**
    Sua ação: `RESPONDER_AO_USUARIO` -> Informe o usuário que o agendamento foi confirmado.

[FLUXO DE CANCELAMENTO (MULTI-ETAPAS)]
1.  **Usuário pede para cancelar:**
    Sua ação: `EXECUTAR_FERRAMENTA` -> `tool_listar_meus_agendamentos()`.
2.  **(RAG) Você recebe a lista de agendamentos:**
    Sua ação: `RESPONDER_AO_USUARIO` -> Liste os agendamentos *exatamente* como vieram, **incluindo os IDs**, e pergunte qual **ID do Agendamento** o usuário deseja cancelar. Se a lista estiver vazia, apenas informe o usuário.
3.  **Usuário responde com o ID (ex: "ID 5"):**
    Sua ação: `EXECUTAR_FERRAMENTA` -> `tool_cancelar_agendamento(agendamento_id=X)`. Você DEVE extrair o `agendamento_id`.
4.  **(RAG) Você recebe o resultado:**
    Sua ação: `RESPONDER_AO_USUARIO` -> Informe o usuário que o agendamento foi cancelado.

[FLUXO DE AGENDAMENTO DE EXAME (MULTI-ETAPAS)]
1.  **Usuário pede para agendar um exame:**
    a. Se o usuário especificar o exame: Vá para o passo 3.
    b. Se NÃO especificar: Use `tool_consultar_exames_disponiveis()`.
2.  **(RAG, se passo 1b) Você recebe a lista de exames:** Apresente a lista ao usuário e peça para ele escolher um.
3.  **Usuário escolheu o tipo de exame:**
    Sua ação: `EXECUTAR_FERRAMENTA` -> `tool_consultar_horarios_exames(tipo_exame="...")`.
4.  **(RAG) Você recebe a lista de horários de exame:**
    Sua ação: `RESPONDER_AO_USUARIO` -> Liste os horários *exatamente* como vieram, **incluindo os IDs**, e pergunte qual **ID do Horário de Exame** o usuário deseja.
5.  **Usuário responde com o ID (ex: "ID 11"):**
    Sua ação: `RESPONDER_AO_USUARIO` -> Agradeça pela seleção do ID (extraia o `horario_exame_id`) e pergunte o **nome completo** do paciente.
6.  **Usuário responde com o nome:**
    Sua ação: `EXECUTAR_FERRAMENTA` -> `tool_marcar_exame(horario_exame_id=X, nome_paciente="...")`.
7.  **(RAG) Você recebe o resultado:**
    Sua ação: `RESPONDER_AO_USUARIO` -> Informe o usuário que o agendamento do exame foi confirmado.

[FLUXO DE CANCELAMENTO DE EXAME (MULTI-ETAPAS)]
1.  **Usuário pede para cancelar um exame:**
    Sua ação: `EXECUTAR_FERRAMENTA` -> `tool_listar_meus_exames_agendados()`.
2.  **(RAG) Você recebe a lista de agendamentos de exames:**
    Sua ação: `RESPONDER_AO_USUARIO` -> Liste os agendamentos *exatamente* como vieram, **incluindo os IDs**, e pergunte qual **ID do Agendamento de Exame** o usuário deseja cancelar. Se a lista estiver vazia, apenas informe o usuário.
3.  **Usuário responde com o ID (ex: "ID 1"):**
    Sua ação: `EXECUTAR_FERRAMENTA` -> `tool_cancelar_exame(agendamento_exame_id=X)`.
4.  **(RAG) Você recebe o resultado:**
    Sua ação: `RESPONDER_AO_USUARIO` -> Informe o usuário que o agendamento do exame foi cancelado.

[FORMATO DE SAÍDA OBRIGATÓRIO (JSON)]
{
  "status_processamento": "...",
  "intencao_detectada": "...",
  "entidades_extraidas": { "especialidade": null, "topico": null, "horario_id": null, "nome_paciente": null, "agendamento_id": null, "tipo_exame": null, "horario_exame_id": null, "agendamento_exame_id": null },
  "acao_requerida": "...",
  "payload_acao": {
    "resposta_para_usuario": "...",
    "ferramenta_solicitada": {
      "nome": null,
      "parametros": {}
    }
  },
  "log_para_desenvolvedor": "..."
}
"#;

const PROMPT_ACK: &str = "OK. Estou pronto para receber a mensagem do usuário.";

/// First Oracle round: prelude, acknowledgement, then the (possibly
/// context-augmented) user text.
pub fn first_round(augmented_text: &str) -> Vec<Message> {
    vec![
        Message::user(SYSTEM_PROMPT),
        Message::model(PROMPT_ACK),
        Message::user(augmented_text),
    ]
}

/// Second (RAG) round: the whole first round plus the model's own raw reply
/// and the synthetic tool-result instruction. No session object; the prior
/// context travels explicitly so a retry is just another call.
pub fn rag_round(
    augmented_text: &str,
    first_reply_raw: &str,
    tool_name: &str,
    tool_result: &str,
) -> Vec<Message> {
    let mut messages = first_round(augmented_text);
    messages.push(Message::model(first_reply_raw));
    messages.push(Message::user(rag_instruction(tool_name, tool_result)));
    messages
}

pub fn rag_instruction(tool_name: &str, tool_result: &str) -> String {
    format!(
        "OK, a ferramenta {tool_name} foi executada. O resultado é: '{tool_result}'. \
         Com base *apenas* nesse resultado, gere a resposta final para o usuário."
    )
}

/// Parses one Oracle reply. Models wrap JSON in markdown fences or chatter
/// despite instructions, so after a direct parse this strips fences and
/// finally tries the outermost brace pair. Anything still unparseable is an
/// error: the turn must not continue on guessed intent.
pub fn parse_reply(raw: &str) -> anyhow::Result<OracleReply> {
    if let Ok(reply) = serde_json::from_str::<OracleReply>(raw) {
        return Ok(reply);
    }

    let cleaned = raw.trim();
    let cleaned = cleaned
        .strip_prefix("```json")
        .or_else(|| cleaned.strip_prefix("```"))
        .unwrap_or(cleaned);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(reply) = serde_json::from_str::<OracleReply>(cleaned) {
        return Ok(reply);
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            return serde_json::from_str::<OracleReply>(&cleaned[start..=end])
                .context("no valid JSON object in oracle reply");
        }
    }

    anyhow::bail!("oracle reply is not a JSON object")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequiredAction;

    #[test]
    fn test_parse_direct_json() {
        let raw = r#"{
            "status_processamento": "sucesso",
            "intencao_detectada": "agendamento",
            "entidades_extraidas": {"especialidade": "Cardiologia"},
            "acao_requerida": "EXECUTAR_FERRAMENTA",
            "payload_acao": {
                "resposta_para_usuario": null,
                "ferramenta_solicitada": {
                    "nome": "tool_consultar_horarios_disponiveis",
                    "parametros": {"especialidade": "Cardiologia"}
                }
            },
            "log_para_desenvolvedor": "buscando horarios"
        }"#;
        let reply = parse_reply(raw).unwrap();
        assert_eq!(reply.action(), RequiredAction::ExecuteTool);
        assert_eq!(
            reply
                .payload_acao
                .ferramenta_solicitada
                .unwrap()
                .nome
                .as_deref(),
            Some("tool_consultar_horarios_disponiveis")
        );
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"acao_requerida\":\"RESPONDER_AO_USUARIO\",\"payload_acao\":{\"resposta_para_usuario\":\"Olá!\"}}\n```";
        let reply = parse_reply(raw).unwrap();
        assert_eq!(reply.action(), RequiredAction::Respond);
        assert_eq!(reply.user_reply(), Some("Olá!"));
    }

    #[test]
    fn test_parse_embedded_json() {
        let raw = "Claro! Aqui está: {\"acao_requerida\":\"RESPONDER_AO_USUARIO\",\"payload_acao\":{\"resposta_para_usuario\":\"Oi\"}} espero ter ajudado";
        let reply = parse_reply(raw).unwrap();
        assert_eq!(reply.user_reply(), Some("Oi"));
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_reply("não sei o que responder").is_err());
        assert!(parse_reply("{broken json").is_err());
    }

    #[test]
    fn test_rag_round_carries_full_context() {
        let messages = rag_round("oi", "{\"acao_requerida\":\"EXECUTAR_FERRAMENTA\"}", "tool_x", "resultado");
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[3].role, "model");
        assert!(messages[4].content.contains("tool_x"));
        assert!(messages[4].content.contains("'resultado'"));
    }
}
