//! Core data models for the restaurant agent

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

//
// ================= Control Prefixes =================
//

/// Prefix for natural-language content (final or intermediate)
pub const ANSWER_PREFIX: &str = "Answer:";

/// Prefix for failed executions and generation failures
pub const ERROR_PREFIX: &str = "Error:";

/// In-band signal that the latest executed query succeeded
pub const QUERY_SUCCESS_SENTINEL: &str = "QUERY_EXECUTED_SUCCESSFULLY";

/// Placeholder for any restaurant field the store or the model left empty
pub const NO_DATA: &str = "정보 없음";

//
// ================= Restaurant =================
//

/// One recommended restaurant, as handed to the map renderer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestaurantInfo {
    #[serde(default = "no_data", deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default = "no_data", deserialize_with = "lenient_text")]
    pub address: String,
    #[serde(default = "no_data", deserialize_with = "lenient_text")]
    pub subway: String,
    #[serde(default = "no_data", deserialize_with = "lenient_text")]
    pub lat: String,
    #[serde(default = "no_data", deserialize_with = "lenient_text")]
    pub lng: String,
    #[serde(default = "no_data", deserialize_with = "lenient_text")]
    pub menu: String,
    #[serde(default = "no_data", deserialize_with = "lenient_text")]
    pub review: String,
}

fn no_data() -> String {
    NO_DATA.to_string()
}

/// Accepts strings, numbers, booleans, or null; blank and null collapse to `NO_DATA`.
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => no_data(),
        serde_json::Value::String(s) if s.trim().is_empty() => no_data(),
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}

fn is_no_data(value: &str) -> bool {
    value.trim().is_empty() || value == NO_DATA
}

impl RestaurantInfo {
    /// Parsed (lat, lng) for map display, or `None` when either is unknown.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let parse = |raw: &str| -> Option<f64> {
            if is_no_data(raw) {
                return None;
            }
            raw.trim().parse::<f64>().ok().filter(|v| *v != 0.0 && v.is_finite())
        };

        Some((parse(&self.lat)?, parse(&self.lng)?))
    }

    /// Fold `other` (same restaurant) into `self`.
    fn absorb(&mut self, other: RestaurantInfo) {
        for (mine, theirs) in [
            (&mut self.subway, other.subway),
            (&mut self.lat, other.lat),
            (&mut self.lng, other.lng),
            (&mut self.review, other.review),
        ] {
            if is_no_data(mine) && !is_no_data(&theirs) {
                *mine = theirs;
            }
        }

        if is_no_data(&other.menu) {
            return;
        }
        if is_no_data(&self.menu) {
            self.menu = other.menu;
            return;
        }

        let mut menus: Vec<String> = split_menus(&self.menu);
        for item in split_menus(&other.menu) {
            if !menus.contains(&item) {
                menus.push(item);
            }
        }
        self.menu = menus.join(", ");
    }
}

fn split_menus(menu: &str) -> Vec<String> {
    menu.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Merge entries describing the same restaurant (same name and address),
/// keeping first-seen order.
pub fn merge_restaurants(infos: Vec<RestaurantInfo>) -> Vec<RestaurantInfo> {
    let mut merged: Vec<RestaurantInfo> = Vec::with_capacity(infos.len());

    for info in infos {
        match merged
            .iter_mut()
            .find(|m| m.name == info.name && m.address == info.address)
        {
            Some(existing) => existing.absorb(info),
            None => merged.push(info),
        }
    }

    merged
}

//
// ================= Synthesized Answer =================
//

/// Structured output of the answer synthesizer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answers {
    pub answer: String,
    pub infos: Vec<RestaurantInfo>,
}

impl Answers {
    pub fn text_only(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            infos: Vec::new(),
        }
    }

    /// Apply the merge rules so each restaurant appears once.
    pub fn normalized(self) -> Self {
        Self {
            answer: self.answer,
            infos: merge_restaurants(self.infos),
        }
    }
}

//
// ================= Final Result =================
//

/// The only two shapes `run_agent` ever returns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AgentOutput {
    Answer {
        answer: String,
        infos: Vec<RestaurantInfo>,
    },
    Error {
        error: String,
    },
}

impl AgentOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, AgentOutput::Error { .. })
    }
}

impl From<Answers> for AgentOutput {
    fn from(answers: Answers) -> Self {
        AgentOutput::Answer {
            answer: answers.answer,
            infos: answers.infos,
        }
    }
}

impl fmt::Display for RestaurantInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.address, self.subway)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_fall_back_to_sentinel() {
        let info: RestaurantInfo = serde_json::from_value(json!({
            "name": "을지면옥",
            "lat": 37.5665,
            "lng": null,
            "menu": ""
        }))
        .unwrap();

        assert_eq!(info.name, "을지면옥");
        assert_eq!(info.address, NO_DATA);
        assert_eq!(info.lat, "37.5665");
        assert_eq!(info.lng, NO_DATA);
        assert_eq!(info.menu, NO_DATA);
        assert!(info.coordinates().is_none());
    }

    #[test]
    fn test_coordinates_accept_numeric_strings() {
        let info: RestaurantInfo = serde_json::from_value(json!({
            "name": "a", "lat": "37.514352", "lng": 127.014352
        }))
        .unwrap();
        assert_eq!(info.coordinates(), Some((37.514352, 127.014352)));

        let zero: RestaurantInfo =
            serde_json::from_value(json!({"name": "b", "lat": "0", "lng": "0"})).unwrap();
        assert!(zero.coordinates().is_none());
    }

    #[test]
    fn test_merge_concatenates_menus() {
        let pizza: RestaurantInfo = serde_json::from_value(json!({
            "name": "논현동 맛집", "address": "논현동", "subway": "논현역",
            "lat": "37.514352", "lng": "127.014352", "menu": "피자", "review": "맛집 후기"
        }))
        .unwrap();
        let steak = RestaurantInfo {
            menu: "스테이크".to_string(),
            ..pizza.clone()
        };
        let dup = pizza.clone();

        let merged = merge_restaurants(vec![pizza, steak, dup]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].menu, "피자, 스테이크");
    }

    #[test]
    fn test_agent_output_shapes() {
        let ok = AgentOutput::from(Answers::text_only("hi"));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"answer": "hi", "infos": []})
        );

        let err = AgentOutput::Error {
            error: "boom".to_string(),
        };
        assert!(err.is_error());
        assert_eq!(serde_json::to_value(&err).unwrap(), json!({"error": "boom"}));
    }
}
