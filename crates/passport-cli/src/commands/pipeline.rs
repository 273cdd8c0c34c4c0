//! `passport pipeline`: inspect and validate pipeline definitions.

use passport_core::orchestration::PipelineDefinition;

fn load(file: Option<&str>) -> Result<PipelineDefinition, String> {
    match file {
        Some(path) => PipelineDefinition::from_file(path).map_err(|e| e.to_string()),
        None => Ok(PipelineDefinition::medical_passport()),
    }
}

/// Print the definition as YAML.
pub fn show(file: Option<&str>) -> Result<(), String> {
    let definition = load(file)?;
    let yaml = serde_yaml::to_string(&definition).map_err(|e| e.to_string())?;
    print!("{}", yaml);
    Ok(())
}

/// Parse and check a definition, then summarize its stages.
pub fn validate(file: &str) -> Result<(), String> {
    let definition = load(Some(file))?;

    println!("✅ {} is valid", file);
    println!("   Pipeline: {} (v{})", definition.name, definition.version);
    if !definition.context_fields.is_empty() {
        println!("   Submission fields: {}", definition.context_fields.join(", "));
    }
    for (index, stage) in definition.stages.iter().enumerate() {
        let exports = if stage.exports.is_empty() {
            String::new()
        } else {
            format!(" → exports {}", stage.exports.join(", "))
        };
        println!("   {}. {}{}", index + 1, stage.skill, exports);
    }
    Ok(())
}
