//! Remote execution and storage descriptors handed to the calculation tools.
//!
//! Every tool call carries both descriptors so the tool server knows where to
//! submit the job and where to put its files. The shapes are fixed by the tool
//! server and must serialize exactly as below.

use dptb_core::{Credentials, DptbError, DptbResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Container image used for calculation jobs unless configured otherwise.
pub const DEFAULT_IMAGE_NAME: &str = "registry.dp.tech/dptech/dp/native/prod-19853/dpa-mcp:0.0.0";
/// Machine class used for calculation jobs unless configured otherwise.
pub const DEFAULT_SCASS_TYPE: &str = "1 * NVIDIA V100_32g";

/// Image and machine class for submitted jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResources {
    #[serde(default = "default_image_name")]
    pub image_name: String,
    #[serde(default = "default_scass_type")]
    pub scass_type: String,
}

fn default_image_name() -> String {
    DEFAULT_IMAGE_NAME.to_string()
}

fn default_scass_type() -> String {
    DEFAULT_SCASS_TYPE.to_string()
}

impl Default for JobResources {
    fn default() -> Self {
        Self {
            image_name: default_image_name(),
            scass_type: default_scass_type(),
        }
    }
}

/// `{type, machine:{batch_type, context_type, remote_profile:{...}}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub machine: Machine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub batch_type: String,
    pub context_type: String,
    pub remote_profile: RemoteProfile,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProfile {
    pub email: String,
    pub password: String,
    pub program_id: i64,
    pub input_data: InputData,
}

impl fmt::Debug for RemoteProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProfile")
            .field("email", &self.email)
            .field("password", &"***")
            .field("program_id", &self.program_id)
            .field("input_data", &self.input_data)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputData {
    pub image_name: String,
    pub job_type: String,
    pub platform: String,
    pub scass_type: String,
}

impl ExecutorDescriptor {
    /// Dispatcher submitting container jobs to Bohrium.
    pub fn bohrium(email: &str, password: &str, program_id: i64, resources: &JobResources) -> Self {
        Self {
            kind: "dispatcher".to_string(),
            machine: Machine {
                batch_type: "Bohrium".to_string(),
                context_type: "Bohrium".to_string(),
                remote_profile: RemoteProfile {
                    email: email.to_string(),
                    password: password.to_string(),
                    program_id,
                    input_data: InputData {
                        image_name: resources.image_name.clone(),
                        job_type: "container".to_string(),
                        platform: "ali".to_string(),
                        scass_type: resources.scass_type.clone(),
                    },
                },
            },
        }
    }
}

/// `{type, username, password, project_id}`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub username: String,
    pub password: String,
    pub project_id: i64,
}

impl fmt::Debug for StorageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageDescriptor")
            .field("kind", &self.kind)
            .field("username", &self.username)
            .field("password", &"***")
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl StorageDescriptor {
    /// Bohrium project storage.
    pub fn bohrium(username: &str, password: &str, project_id: i64) -> Self {
        Self {
            kind: "bohrium".to_string(),
            username: username.to_string(),
            password: password.to_string(),
            project_id,
        }
    }
}

/// Both descriptors for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBackends {
    pub executor: ExecutorDescriptor,
    pub storage: StorageDescriptor,
}

impl RemoteBackends {
    /// Builds the descriptors from login credentials. The project id must be
    /// an integer.
    pub fn from_credentials(credentials: &Credentials, resources: &JobResources) -> DptbResult<Self> {
        let project_id = parse_project_id(&credentials.project_id)?;
        Ok(Self {
            executor: ExecutorDescriptor::bohrium(
                &credentials.username,
                &credentials.password,
                project_id,
                resources,
            ),
            storage: StorageDescriptor::bohrium(
                &credentials.username,
                &credentials.password,
                project_id,
            ),
        })
    }
}

pub fn parse_project_id(raw: &str) -> DptbResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| DptbError::Config(format!("project id '{raw}' is not an integer")))
}
