//! Test fixtures for rule-planner.
//!
//! Builders for customers and agents with sensible defaults, plus fake
//! capabilities standing in for the embedding and generation services.

#![allow(dead_code)]

use std::sync::Mutex;

use rule_planner::error::CapabilityError;
use rule_planner::model::{Agent, AgentTable, Customer, CustomerTable, Priority};
use rule_planner::traits::{CodeGenerator, Embedder};

/// Builder for test customers. Defaults: class B, 8-18h, 30 minutes.
#[derive(Clone, Debug)]
pub struct TestCustomer {
    customer: Customer,
}

impl TestCustomer {
    pub fn new(name: &str) -> Self {
        Self {
            customer: Customer {
                id: name.to_lowercase().replace(' ', "-"),
                name: name.to_string(),
                lat: 31.2304,
                lon: 121.4737,
                priority: Priority::B,
                time_window_start: 8,
                time_window_end: 18,
                service_time_minutes: 30,
            },
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.customer.priority = priority;
        self
    }

    pub fn window(mut self, start: u32, end: u32) -> Self {
        self.customer.time_window_start = start;
        self.customer.time_window_end = end;
        self
    }

    pub fn service(mut self, minutes: u32) -> Self {
        self.customer.service_time_minutes = minutes;
        self
    }

    pub fn location(mut self, lat: f64, lon: f64) -> Self {
        self.customer.lat = lat;
        self.customer.lon = lon;
        self
    }

    pub fn build(self) -> Customer {
        self.customer
    }
}

/// Builder for test agents. Default: no configured visit maximum.
#[derive(Clone, Debug)]
pub struct TestAgent {
    agent: Agent,
}

impl TestAgent {
    pub fn new(name: &str) -> Self {
        Self {
            agent: Agent {
                id: name.to_lowercase().replace(' ', "-"),
                name: name.to_string(),
                max_visits_per_day: None,
            },
        }
    }

    pub fn max_visits(mut self, max: u32) -> Self {
        self.agent.max_visits_per_day = Some(max);
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }
}

pub fn customers(rows: Vec<TestCustomer>) -> CustomerTable {
    CustomerTable::new(rows.into_iter().map(TestCustomer::build).collect()).unwrap()
}

pub fn agents(rows: Vec<TestAgent>) -> AgentTable {
    AgentTable::new(rows.into_iter().map(TestAgent::build).collect()).unwrap()
}

/// One hospital (class A, 9-12h) and two class B shops.
pub fn clinic_round() -> CustomerTable {
    customers(vec![
        TestCustomer::new("Ruijin Hospital")
            .priority(Priority::A)
            .window(9, 12)
            .location(31.2125, 121.4655),
        TestCustomer::new("Metro Mart").location(31.2397, 121.4998),
        TestCustomer::new("Lawson Jingan").location(31.2286, 121.4452),
    ])
}

pub fn rules(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|text| text.to_string()).collect()
}

/// Embeds text as presence flags of a few domain words.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    const WORDS: [&'static str; 5] = ["拜访", "客户", "优先", "医院", "每天"];
}

impl Embedder for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword-flags"
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CapabilityError> {
        Ok(texts
            .iter()
            .map(|text| {
                Self::WORDS
                    .iter()
                    .map(|word| if text.contains(word) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

/// Generator returning a fixed reply and recording prompts.
pub struct ScriptedGenerator {
    reply: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl CodeGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, _system: &str, prompt: &str) -> Result<String, CapabilityError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().map_err(CapabilityError::Protocol)
    }
}
