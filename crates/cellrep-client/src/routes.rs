//! Route table shared by the client and the cell's HTTP servers.
//!
//! | Method | Path | Name | Listener |
//! |---|---|---|---|
//! | GET | `/state` | State | secure |
//! | POST | `/work` | Perform | secure |
//! | POST | `/v1/lrps/:process_guid/instances/:instance_guid/stop` | StopLRPInstance | secure |
//! | POST | `/v1/tasks/:task_guid/cancel` | CancelTask | secure |
//! | POST | `/sim/reset` | Sim_Reset | secure |
//! | GET | `/ping` | Ping | insecure |
//! | POST | `/evacuate` | Evacuate | insecure |
//! | GET | `/v1/containers` | ContainerList | insecure |

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    Get,
    Post,
}

impl RouteMethod {
    pub fn as_http(self) -> http::Method {
        match self {
            RouteMethod::Get => http::Method::GET,
            RouteMethod::Post => http::Method::POST,
        }
    }
}

/// A named endpoint. Path segments starting with `:` are parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub name: &'static str,
    pub method: RouteMethod,
    pub path: &'static str,
}

pub const STATE: Route = Route {
    name: "State",
    method: RouteMethod::Get,
    path: "/state",
};

pub const PERFORM: Route = Route {
    name: "Perform",
    method: RouteMethod::Post,
    path: "/work",
};

pub const STOP_LRP_INSTANCE: Route = Route {
    name: "StopLRPInstance",
    method: RouteMethod::Post,
    path: "/v1/lrps/:process_guid/instances/:instance_guid/stop",
};

pub const CANCEL_TASK: Route = Route {
    name: "CancelTask",
    method: RouteMethod::Post,
    path: "/v1/tasks/:task_guid/cancel",
};

pub const SIM_RESET: Route = Route {
    name: "Sim_Reset",
    method: RouteMethod::Post,
    path: "/sim/reset",
};

pub const PING: Route = Route {
    name: "Ping",
    method: RouteMethod::Get,
    path: "/ping",
};

pub const EVACUATE: Route = Route {
    name: "Evacuate",
    method: RouteMethod::Post,
    path: "/evacuate",
};

pub const CONTAINER_LIST: Route = Route {
    name: "ContainerList",
    method: RouteMethod::Get,
    path: "/v1/containers",
};

/// Routes served only on the authenticated listener.
pub const SECURE_ROUTES: &[Route] = &[STATE, PERFORM, STOP_LRP_INSTANCE, CANCEL_TASK, SIM_RESET];

/// Low-sensitivity routes served on the plaintext listener.
pub const INSECURE_ROUTES: &[Route] = &[PING, EVACUATE, CONTAINER_LIST];

impl Route {
    /// Path segments with parameters substituted. Parameters the template
    /// does not mention are ignored.
    pub fn segments(&self, params: &[(&str, &str)]) -> ClientResult<Vec<String>> {
        self.path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => params
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| value.to_string())
                    .ok_or_else(|| ClientError::MissingParam(name.to_string())),
                None => Ok(segment.to_string()),
            })
            .collect()
    }

    /// The path in axum's `{param}` syntax.
    pub fn axum_path(&self) -> String {
        self.path
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => format!("{{{name}}}"),
                None => segment.to_string(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}
