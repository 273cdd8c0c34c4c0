use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::{AgentContext, Skill};
use crate::capability::tools::{ClinicalParseInput, ClinicalParseOutput};
use crate::error::PassportError;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StructureInput {
    pub translated_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_meta: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StructureOutput {
    /// FHIR-like `Bundle` of conditions, medications, procedures and
    /// observations.
    pub bundle: Map<String, Value>,
}

/// Turn the translated note into a structured clinical bundle.
pub struct StructureSkill;

#[async_trait]
impl Skill for StructureSkill {
    type Input = StructureInput;
    type Output = StructureOutput;

    fn name(&self) -> &str {
        "structure"
    }

    fn description(&self) -> &str {
        "Convert the translated clinical note into a minimal FHIR-like bundle."
    }

    fn tags(&self) -> Vec<String> {
        vec!["fhir".into(), "structuring".into()]
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["clinical_parse_to_fhir"]
    }

    async fn run(&self, ctx: &AgentContext, input: StructureInput) -> Result<StructureOutput, PassportError> {
        let parsed: ClinicalParseOutput = ctx
            .call_tool_as(
                "clinical_parse_to_fhir",
                ClinicalParseInput {
                    text: input.translated_text,
                    patient_meta: input.patient_meta,
                },
            )
            .await?;
        Ok(StructureOutput {
            bundle: parsed.bundle,
        })
    }
}
