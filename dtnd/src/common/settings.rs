// Copyright (C) 2023 Felix Huettner
//
// This file is part of DTND.
//
// DTND is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// DTND is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    pub my_node_id: String,
    pub store_db_path: String,
    pub store_payload_path: Option<String>,
    pub store_init: bool,
    pub store_tidy: bool,
    pub router_type: String,
    pub event_queue_depth: usize,
    pub tokio_tracing_port: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            my_node_id: "dtn://defaultnodeid".into(),
            store_db_path: "./dtnd-db".into(),
            store_payload_path: None,
            store_init: false,
            store_tidy: false,
            router_type: "static".into(),
            event_queue_depth: 1024,
            tokio_tracing_port: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let mut settings = Settings::default();
        if let Ok(setting) = env::var("NODE_ID") {
            settings.my_node_id = setting;
        }
        if let Ok(setting) = env::var("STORE_DB_PATH") {
            settings.store_db_path = setting;
        }
        if let Ok(setting) = env::var("STORE_PAYLOAD_PATH") {
            settings.store_payload_path = Some(setting);
        }
        if let Ok(setting) = env::var("STORE_INIT") {
            settings.store_init = setting == "true";
        }
        if let Ok(setting) = env::var("STORE_TIDY") {
            settings.store_tidy = setting == "true";
        }
        if let Ok(setting) = env::var("ROUTER_TYPE") {
            settings.router_type = setting;
        }
        if let Ok(setting) = env::var("EVENT_QUEUE_DEPTH") {
            if let Ok(depth) = setting.parse() {
                settings.event_queue_depth = depth;
            }
        }
        if let Ok(setting) = env::var("TOKIO_TRACING_PORT") {
            settings.tokio_tracing_port = Some(setting);
        }
        settings
    }
}
