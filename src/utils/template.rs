//! `{{name}}` placeholder rendering for command templates.

pub struct TemplateVars;

impl TemplateVars {
    pub const PROJECT: &'static str = "project";
    pub const CONFIGURATION: &'static str = "configuration";
    pub const OUTPUT: &'static str = "output";
    pub const VERSION: &'static str = "version";
    pub const INFORMATIONAL_VERSION: &'static str = "informationalVersion";
    pub const ASSEMBLY_VERSION: &'static str = "assemblyVersion";
}

pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

pub fn is_present(template: &str, key: &str) -> bool {
    let placeholder = format!("{{{{{}}}}}", key);
    template.contains(&placeholder)
}
