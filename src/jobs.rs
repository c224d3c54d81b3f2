use std::fmt;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::domain::{MonitorId, ReferenceId};
use crate::error::KiraError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum JobTask {
    CopyReference {
        reference_id: ReferenceId,
    },
    UnzipReference {
        reference_id: ReferenceId,
        member: String,
    },
    BuildIndex {
        reference_id: ReferenceId,
    },
    Download {
        url: String,
        monitor_id: MonitorId,
        temp_dir: Utf8PathBuf,
    },
    InstallReference {
        reference_id: ReferenceId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(flatten)]
    pub task: JobTask,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Box<JobRequest>>,
}

impl JobRequest {
    pub fn new(task: JobTask) -> Self {
        Self {
            task,
            on_success: None,
        }
    }

    pub fn then(mut self, task: JobTask) -> Self {
        let tail = match self.on_success.take() {
            Some(next) => (*next).then(task),
            None => JobRequest::new(task),
        };
        self.on_success = Some(Box::new(tail));
        self
    }

    pub fn tasks(&self) -> Vec<&JobTask> {
        let mut out = vec![&self.task];
        let mut next = self.on_success.as_deref();
        while let Some(request) = next {
            out.push(&request.task);
            next = request.on_success.as_deref();
        }
        out
    }
}

pub trait Scheduler: Send + Sync {
    fn dispatch(&self, request: &JobRequest) -> Result<JobHandle, KiraError>;
}

impl<T: Scheduler + ?Sized> Scheduler for Box<T> {
    fn dispatch(&self, request: &JobRequest) -> Result<JobHandle, KiraError> {
        (**self).dispatch(request)
    }
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    id: String,
}

#[derive(Clone)]
pub struct HttpScheduler {
    client: Client,
    base_url: String,
}

impl HttpScheduler {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-reflib/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::Dispatch(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| KiraError::Dispatch(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Scheduler for HttpScheduler {
    fn dispatch(&self, request: &JobRequest) -> Result<JobHandle, KiraError> {
        let url = format!("{}/jobs", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(|err| KiraError::Dispatch(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "scheduler rejected job".to_string());
            return Err(KiraError::SchedulerStatus { status, message });
        }
        let body: DispatchResponse = response
            .json()
            .map_err(|err| KiraError::Dispatch(err.to_string()))?;
        Ok(JobHandle::new(body.id))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoScheduler;

impl Scheduler for NoScheduler {
    fn dispatch(&self, _request: &JobRequest) -> Result<JobHandle, KiraError> {
        Err(KiraError::Dispatch(
            "no scheduler configured (set scheduler_url)".to_string(),
        ))
    }
}
