//! Service catalog advertised on `GET /v2/catalog`.

use serde::{Deserialize, Serialize};

use redisbroker_core::config::{BrokerConfig, DEDICATED_PLAN_NAME, SHARED_PLAN_NAME};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub plan_updateable: bool,
    pub plans: Vec<Plan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Catalog {
    /// One service carrying the plans the configuration enables.
    pub fn from_config(config: &BrokerConfig) -> Self {
        let mut plans = Vec::new();
        if config.shared_enabled() {
            plans.push(Plan {
                id: config.broker.shared_plan_id.clone(),
                name: SHARED_PLAN_NAME.to_string(),
                description: "This plan provides a single Redis process on a shared VM, which is suitable for development and testing workloads".to_string(),
            });
        }
        if config.dedicated_enabled() {
            plans.push(Plan {
                id: config.broker.dedicated_plan_id.clone(),
                name: DEDICATED_PLAN_NAME.to_string(),
                description: "This plan provides a single Redis process on a dedicated VM, which is suitable for production workloads".to_string(),
            });
        }

        Self {
            services: vec![Service {
                id: config.broker.service_id.clone(),
                name: config.broker.service_name.clone(),
                description: config.broker.description.clone(),
                bindable: true,
                plan_updateable: false,
                plans,
            }],
        }
    }
}
