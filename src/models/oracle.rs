use serde::{Deserialize, Deserializer};

/// One structured reply from the language model. The field names are the
/// wire contract the instruction prelude demands; every call must come back
/// as exactly this JSON object.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleReply {
    #[serde(default)]
    pub status_processamento: Option<String>,
    #[serde(default)]
    pub intencao_detectada: Option<String>,
    #[serde(default)]
    pub entidades_extraidas: ExtractedEntities,
    #[serde(default)]
    pub acao_requerida: Option<String>,
    #[serde(default)]
    pub payload_acao: ActionPayload,
    #[serde(default)]
    pub log_para_desenvolvedor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredAction {
    Respond,
    ExecuteTool,
    Other,
}

impl OracleReply {
    pub fn action(&self) -> RequiredAction {
        match self.acao_requerida.as_deref() {
            Some("RESPONDER_AO_USUARIO") => RequiredAction::Respond,
            Some("EXECUTAR_FERRAMENTA") => RequiredAction::ExecuteTool,
            _ => RequiredAction::Other,
        }
    }

    pub fn user_reply(&self) -> Option<&str> {
        self.payload_acao.resposta_para_usuario.as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default)]
    pub especialidade: Option<String>,
    #[serde(default)]
    pub topico: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub horario_id: Option<i64>,
    #[serde(default)]
    pub nome_paciente: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub agendamento_id: Option<i64>,
    #[serde(default)]
    pub tipo_exame: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub horario_exame_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub agendamento_exame_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionPayload {
    #[serde(default)]
    pub resposta_para_usuario: Option<String>,
    #[serde(default)]
    pub ferramenta_solicitada: Option<ToolRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolRequest {
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub parametros: serde_json::Map<String, serde_json::Value>,
}

/// The model sends ids as numbers or as numeric strings, depending on its
/// mood. Accept both; anything else becomes None.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_id))
}

pub(crate) fn coerce_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_as_number_and_string() {
        let json = r#"{"horario_id": 3, "agendamento_id": "12"}"#;
        let entities: ExtractedEntities = serde_json::from_str(json).unwrap();
        assert_eq!(entities.horario_id, Some(3));
        assert_eq!(entities.agendamento_id, Some(12));
    }

    #[test]
    fn test_id_null_and_garbage() {
        let json = r#"{"horario_id": null, "agendamento_id": "soon"}"#;
        let entities: ExtractedEntities = serde_json::from_str(json).unwrap();
        assert_eq!(entities.horario_id, None);
        assert_eq!(entities.agendamento_id, None);
    }

    #[test]
    fn test_action_mapping() {
        let reply: OracleReply =
            serde_json::from_str(r#"{"acao_requerida": "RESPONDER_AO_USUARIO"}"#).unwrap();
        assert_eq!(reply.action(), RequiredAction::Respond);

        let reply: OracleReply =
            serde_json::from_str(r#"{"acao_requerida": "EXECUTAR_FERRAMENTA"}"#).unwrap();
        assert_eq!(reply.action(), RequiredAction::ExecuteTool);

        let reply: OracleReply =
            serde_json::from_str(r#"{"acao_requerida": "FAZER_CAFE"}"#).unwrap();
        assert_eq!(reply.action(), RequiredAction::Other);
    }
}
