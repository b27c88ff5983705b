//! 流水线数据模型：Understanding / GenerationPlan / Evaluation / CodingResult
//!
//! JSON 字段使用 camelCase，与提示词中的 Schema 一致；分数在反序列化后夹到 [0, 1]。

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::pipeline::FileChange;

/// 对原始指令的结构化理解
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Understanding {
    /// 一句话目标
    pub objective: String,
    /// 需要实现的功能点（有序）
    #[serde(default)]
    pub required_features: Vec<String>,
    /// 文件 -> 相关度（0 到 1）
    #[serde(default)]
    pub context_relevance: BTreeMap<String, f64>,
}

impl Understanding {
    pub fn normalized(mut self) -> Self {
        for score in self.context_relevance.values_mut() {
            *score = clamp_unit(*score);
        }
        self
    }
}

/// 计划中的一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStep {
    /// 动作描述，如 "modify /src/a.kt: rename foo to bar"
    pub action: String,
    #[serde(default)]
    pub input: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub expected_output: String,
}

/// 有序实现计划
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPlan {
    pub steps: Vec<GenerationStep>,
    #[serde(default)]
    pub expected_outcome: String,
    #[serde(default)]
    pub validation_criteria: Vec<String>,
}

impl GenerationPlan {
    /// 渲染为 prompt 段落
    pub fn to_prompt_section(&self) -> String {
        let mut s = String::from("## Plan\n");
        if !self.expected_outcome.is_empty() {
            s.push_str(&format!("Expected outcome: {}\n", self.expected_outcome));
        }
        s.push_str("Steps:\n");
        for (i, step) in self.steps.iter().enumerate() {
            s.push_str(&format!("{}. {}", i + 1, step.action));
            if !step.expected_output.is_empty() {
                s.push_str(&format!(" -> {}", step.expected_output));
            }
            s.push('\n');
            if !step.input.is_empty() {
                let input = serde_json::to_string(&step.input).unwrap_or_default();
                s.push_str(&format!("   input: {}\n", input));
            }
        }
        if !self.validation_criteria.is_empty() {
            s.push_str("Validation criteria:\n");
            for c in &self.validation_criteria {
                s.push_str(&format!("- {}\n", c));
            }
        }
        s
    }
}

/// 对一次生成结果的评估
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub meets_requirements: bool,
    /// 0 到 1
    pub confidence: f64,
    #[serde(default)]
    pub suggested_improvements: Vec<String>,
}

impl Evaluation {
    pub fn normalized(mut self) -> Self {
        self.confidence = clamp_unit(self.confidence);
        self
    }
}

/// 生成 / 编码结果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodingResult {
    pub file_changes: Vec<FileChange>,
    pub explanation: String,
    pub success: bool,
}

/// 批处理策略中每轮生成的结果与 CodingResult 同构
pub type GenerationResult = CodingResult;

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_understanding_deserialize_and_clamp() {
        let json = r#"{
            "objective": "Rename foo to bar",
            "requiredFeatures": ["rename"],
            "contextRelevance": {"/tmp/a.kt": 1.7, "/tmp/b.kt": -0.2}
        }"#;
        let u: Understanding = serde_json::from_str(json).unwrap();
        let u = u.normalized();
        assert_eq!(u.required_features, vec!["rename"]);
        assert_eq!(u.context_relevance["/tmp/a.kt"], 1.0);
        assert_eq!(u.context_relevance["/tmp/b.kt"], 0.0);
    }

    #[test]
    fn test_plan_defaults_and_prompt() {
        let plan: GenerationPlan = serde_json::from_str(
            r#"{"steps": [{"action": "edit a.kt", "expectedOutput": "foo renamed"}]}"#,
        )
        .unwrap();
        assert!(plan.validation_criteria.is_empty());
        let section = plan.to_prompt_section();
        assert!(section.contains("1. edit a.kt -> foo renamed"));
    }

    #[test]
    fn test_plan_missing_steps_fails() {
        assert!(serde_json::from_str::<GenerationPlan>(r#"{"expectedOutcome": "x"}"#).is_err());
    }

    #[test]
    fn test_evaluation_clamp() {
        let e: Evaluation =
            serde_json::from_str(r#"{"meetsRequirements": true, "confidence": 3}"#).unwrap();
        assert_eq!(e.normalized().confidence, 1.0);
    }
}
