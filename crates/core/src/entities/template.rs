//! Template entity (§3).

use crate::ids::TemplateId;
use crate::tenant::AgentScoped;
use crate::variable::VarValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateMode {
    /// Emit verbatim, skip the LLM entirely.
    Exclusive,
    /// Inject as a hint into the generation prompt.
    Suggest,
    /// Used when enforcement fails terminally.
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    #[serde(flatten)]
    pub header: AgentScoped,
    pub id: TemplateId,
    pub name: String,
    /// Text containing `{placeholder}` markers.
    pub text: String,
    pub mode: TemplateMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPlaceholder(pub String);

impl Template {
    /// Render `{placeholder}` markers from a resolved variable map.
    /// Returns the set of placeholders that could not be resolved rather
    /// than partially rendering, so callers can decide whether a partial
    /// EXCLUSIVE render is acceptable.
    pub fn render(&self, values: &HashMap<String, VarValue>) -> Result<String, Vec<MissingPlaceholder>> {
        let mut missing = Vec::new();
        let mut out = String::with_capacity(self.text.len());
        let mut chars = self.text.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '{' {
                let mut name = String::new();
                let mut closed = false;
                for c2 in chars.by_ref() {
                    if c2 == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c2);
                }
                if !closed {
                    out.push('{');
                    out.push_str(&name);
                    continue;
                }
                match values.get(&name) {
                    Some(v) => out.push_str(&v.to_string()),
                    None => missing.push(MissingPlaceholder(name)),
                }
            } else {
                out.push(c);
            }
        }
        if missing.is_empty() {
            Ok(out)
        } else {
            Err(missing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AgentId, TenantId};

    fn template(text: &str) -> Template {
        Template {
            header: AgentScoped::new(TenantId::new(), AgentId::new()),
            id: TemplateId::new(),
            name: "t".into(),
            text: text.into(),
            mode: TemplateMode::Exclusive,
        }
    }

    #[test]
    fn renders_when_all_placeholders_resolve() {
        let t = template("Hello {name}, your balance is {balance}.");
        let mut values = HashMap::new();
        values.insert("name".to_string(), VarValue::from("Ada"));
        values.insert("balance".to_string(), VarValue::from(42.0));
        assert_eq!(t.render(&values).unwrap(), "Hello Ada, your balance is 42.");
    }

    #[test]
    fn reports_missing_placeholders() {
        let t = template("Hello {name}.");
        let values = HashMap::new();
        let err = t.render(&values).unwrap_err();
        assert_eq!(err, vec![MissingPlaceholder("name".into())]);
    }
}
