//! Simulated account-balance lookup: a read-only tool a rule might
//! attach so the generator can ground a response in a concrete number
//! rather than guessing.

use align_core::ids::ToolId;
use align_core::tool::{InputSource, Tool, ToolInputSpec, ToolInputs, ToolOutputs};
use align_core::variable::VarValue;
use align_core::{Error, Result};
use async_trait::async_trait;

pub struct LookupAccountTool {
    id: ToolId,
}

impl LookupAccountTool {
    pub fn new(id: ToolId) -> Self {
        Self { id }
    }

    /// Deterministic stand-in for a real ledger call: derives a stable
    /// balance from the account id so repeated lookups in tests and
    /// demos are reproducible without external state.
    fn simulated_balance(account_id: &str) -> f64 {
        let seed: u32 = account_id.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
        100.0 + (seed % 5000) as f64
    }
}

#[async_trait]
impl Tool for LookupAccountTool {
    fn id(&self) -> ToolId {
        self.id
    }

    fn name(&self) -> &str {
        "lookup_account_balance"
    }

    fn input_spec(&self) -> Vec<ToolInputSpec> {
        vec![ToolInputSpec { name: "account_id".to_string(), source: InputSource::ProfileField("account_id".to_string()), required: true }]
    }

    async fn run(&self, inputs: &ToolInputs) -> Result<ToolOutputs> {
        let account_id = inputs
            .get("account_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::ToolFailed("account_id could not be resolved".to_string()))?;

        let balance = Self::simulated_balance(account_id);
        let mut outputs = ToolOutputs::new();
        outputs.insert("balance".to_string(), VarValue::from(balance));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_is_deterministic() {
        let tool = LookupAccountTool::new(ToolId::new());
        let mut inputs = ToolInputs::new();
        inputs.insert("account_id".to_string(), VarValue::from("acct-123"));

        let first = tool.run(&inputs).await.unwrap();
        let second = tool.run(&inputs).await.unwrap();
        assert_eq!(first.get("balance"), second.get("balance"));
    }
}
