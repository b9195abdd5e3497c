//! CI-aggregation client (spec §4.6).
//!
//! For a branch and project-slug: fetch the most recent pipeline, then
//! its workflows, then each workflow's jobs. Jobs in state `failed` have
//! their test metadata fetched in parallel (genuine OS threads, not
//! async tasks — spec §5 draws this distinction against the
//! projects-v2 attachment path, which stays sequential). `GetBuildDetails`
//! is a separate entry point onto the CI provider's older v1.1 API for
//! step-by-step build output.

use std::time::Duration;

use serde::Deserialize;
use vibe_retry::RetryExecutor;
use vibe_types::{
    BuildDetail, BuildStep, CiJob, CiStatus, CiWorkflow, FailedJob, FailedTest, JobStatus,
    NotFoundKind, VibeError,
};

pub const DEFAULT_API_V2_URL: &str = "https://circleci.com/api/v2";
pub const DEFAULT_API_V1_URL: &str = "https://circleci.com/api/v1.1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const USER_AGENT: &str = concat!("vibe/", env!("CARGO_PKG_VERSION"));

pub struct CiClient {
    v2_base_url: String,
    v1_base_url: String,
    token: String,
    client: reqwest::blocking::Client,
    retry: RetryExecutor,
}

impl CiClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_urls(DEFAULT_API_V2_URL, DEFAULT_API_V1_URL, token)
    }

    pub fn with_urls(v2_base_url: impl Into<String>, v1_base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            v2_base_url: v2_base_url.into().trim_end_matches('/').to_string(),
            v1_base_url: v1_base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
            retry: RetryExecutor::from_policy(vibe_retry::RetryPolicy::Default),
        }
    }

    fn get(&self, base_url: &str, path: &str) -> Result<reqwest::blocking::Response, VibeError> {
        self.retry.run_vibe(|_attempt| {
            self.client
                .get(format!("{base_url}{path}"))
                .header("Circle-Token", &self.token)
                .send()
                .map_err(|e| classify_transport_error(&e))
        })
    }

    /// Derive a CircleCI project slug from a git remote URL (spec §4.6,
    /// "Project-slug derivation mirrors the repo-fallback logic"). Reuses
    /// the same remote-parsing regexes the hosting client's fallback path
    /// uses, rather than a second copy of them.
    pub fn project_slug(origin_remote_url: &str) -> Result<String, VibeError> {
        let coordinate = vibe_hosting::fallback::parse_remote_url(origin_remote_url).ok_or_else(|| {
            VibeError::validation(
                "origin_remote_url",
                origin_remote_url,
                "could not parse an owner/repo coordinate from the remote URL",
            )
        })?;
        Ok(format!("gh/{}/{}", coordinate.owner, coordinate.repo))
    }

    /// Fetch the aggregated CI status for `branch` under `project_slug`
    /// (spec §4.6, steps a-d).
    pub fn get_status(&self, project_slug: &str, branch: &str) -> Result<CiStatus, VibeError> {
        let pipeline = self.latest_pipeline_for_branch(project_slug, branch)?;

        let workflows_wire: WorkflowsWire = self.get_json(
            &self.v2_base_url,
            &format!("/pipeline/{}/workflow", pipeline.id),
        )?;

        let mut workflows = Vec::with_capacity(workflows_wire.items.len());
        for wf in &workflows_wire.items {
            let jobs_wire: JobsWire = self.get_json(&self.v2_base_url, &format!("/workflow/{}/job", wf.id))?;
            let jobs: Vec<CiJob> = jobs_wire
                .items
                .into_iter()
                .filter_map(|j| {
                    Some(CiJob {
                        name: j.name,
                        number: j.job_number?,
                        status: job_status_from_str(&j.status),
                    })
                })
                .collect();
            workflows.push(CiWorkflow {
                name: wf.name.clone(),
                id: wf.id.clone(),
                status: job_status_from_str(&wf.status),
                jobs,
            });
        }

        let failed_jobs = self.collect_failed_jobs(project_slug, &workflows)?;

        Ok(CiStatus {
            branch: branch.to_string(),
            project_slug: project_slug.to_string(),
            pipeline_number: pipeline.number,
            workflows,
            failed_jobs,
        })
    }

    fn latest_pipeline_for_branch(&self, project_slug: &str, branch: &str) -> Result<PipelineWire, VibeError> {
        let encoded_branch = urlencode(branch);
        let wire: PipelinesWire = self.get_json(
            &self.v2_base_url,
            &format!("/project/{project_slug}/pipeline/branch/{encoded_branch}"),
        )?;
        wire.items
            .into_iter()
            .next()
            .ok_or_else(|| VibeError::not_found(NotFoundKind::Other, format!("no pipeline for branch {branch}")))
    }

    /// Fetch test metadata for every failed job in `workflows`, one OS
    /// thread per failed job (spec §4.6 step d / spec §5).
    fn collect_failed_jobs(&self, project_slug: &str, workflows: &[CiWorkflow]) -> Result<Vec<FailedJob>, VibeError> {
        let targets: Vec<(&str, &CiJob)> = workflows
            .iter()
            .flat_map(|wf| wf.jobs.iter().filter(|j| j.status == JobStatus::Failed).map(move |j| (wf.name.as_str(), j)))
            .collect();

        if targets.is_empty() {
            return Ok(Vec::new());
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = targets
                .into_iter()
                .map(|(workflow_name, job)| {
                    scope.spawn(move || {
                        let failed_tests = self.fetch_failed_tests(project_slug, job.number).unwrap_or_default();
                        FailedJob {
                            workflow_name: workflow_name.to_string(),
                            job_name: job.name.clone(),
                            job_number: job.number,
                            failed_tests,
                        }
                    })
                })
                .collect();

            Ok(handles.into_iter().map(|h| h.join().expect("failed-job fetch thread panicked")).collect())
        })
    }

    fn fetch_failed_tests(&self, project_slug: &str, job_number: u64) -> Result<Vec<FailedTest>, VibeError> {
        let wire: TestsWire = self.get_json(&self.v2_base_url, &format!("/project/{project_slug}/job/{job_number}/tests"))?;
        Ok(wire
            .items
            .into_iter()
            .filter(|t| t.result != "success")
            .map(|t| FailedTest {
                name: t.name,
                class_name: t.classname,
                file: t.file,
                message: t.message,
            })
            .collect())
    }

    /// `GetBuildDetails(build_number)`: the older v1.1 API, returning
    /// step-by-step output for each action whose log is available (spec
    /// §4.6, "switches to the older v1.1 API").
    pub fn get_build_details(&self, project_slug: &str, build_number: u64) -> Result<BuildDetail, VibeError> {
        let vcs_path = project_slug.replacen("gh/", "github/", 1);
        let wire: BuildWire = self.get_json(&self.v1_base_url, &format!("/project/{vcs_path}/{build_number}"))?;

        let mut steps = Vec::with_capacity(wire.steps.len());
        for step in wire.steps {
            let mut output = String::new();
            let mut worst_status = JobStatus::Success;
            for action in &step.actions {
                let status = action.status.as_deref().map(job_status_from_str).unwrap_or(JobStatus::Pending);
                if matches!(status, JobStatus::Failed) {
                    worst_status = JobStatus::Failed;
                }
                if action.has_output {
                    if let Some(url) = &action.output_url {
                        if let Ok(chunk) = self.fetch_output_log(url) {
                            if !output.is_empty() {
                                output.push('\n');
                            }
                            output.push_str(&chunk);
                        }
                    }
                }
            }
            steps.push(BuildStep {
                name: step.name,
                status: worst_status,
                output: if output.is_empty() { None } else { Some(output) },
            });
        }

        Ok(BuildDetail { build_number, steps })
    }

    /// An action's `output_url` points at a message-stream shaped JSON
    /// array (`[{"message": "...", ...}, ...]`); concatenate the messages.
    fn fetch_output_log(&self, output_url: &str) -> Result<String, VibeError> {
        let response = self
            .retry
            .run_vibe(|_attempt| self.client.get(output_url).send().map_err(|e| classify_transport_error(&e)))?;
        let messages: Vec<OutputMessageWire> = response.json().map_err(|e| VibeError::Other(e.into()))?;
        Ok(messages.into_iter().map(|m| m.message).collect::<Vec<_>>().join(""))
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, base_url: &str, path: &str) -> Result<T, VibeError> {
        let response = self.get(base_url, path)?;
        handle_status(&response, path)?;
        response.json().map_err(|e| VibeError::Other(e.into()))
    }
}

fn classify_transport_error(e: &reqwest::Error) -> VibeError {
    if e.is_timeout() || e.is_connect() {
        VibeError::transient("ci request", e.to_string())
    } else {
        VibeError::Other(anyhow::anyhow!(e.to_string()))
    }
}

fn handle_status(response: &reqwest::blocking::Response, detail: &str) -> Result<(), VibeError> {
    match response.status() {
        reqwest::StatusCode::OK => Ok(()),
        reqwest::StatusCode::NOT_FOUND => Err(VibeError::not_found(NotFoundKind::Other, detail)),
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => Err(VibeError::Authentication {
            service: "circleci".to_string(),
            token_source: "CIRCLECI_TOKEN".to_string(),
        }),
        status if status.as_u16() == 429 || status.is_server_error() => {
            Err(VibeError::transient("ci request", status.to_string()))
        }
        status => Err(VibeError::Other(anyhow::anyhow!("unexpected ci response: {status}"))),
    }
}

fn job_status_from_str(s: &str) -> JobStatus {
    match s {
        "success" | "fixed" => JobStatus::Success,
        "failed" | "infrastructure_fail" | "timedout" => JobStatus::Failed,
        "running" => JobStatus::Running,
        "canceled" | "cancelled" => JobStatus::Cancelled,
        _ => JobStatus::Pending,
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct PipelineWire {
    id: String,
    number: u64,
}

#[derive(Debug, Deserialize)]
struct PipelinesWire {
    items: Vec<PipelineWire>,
}

#[derive(Debug, Deserialize)]
struct WorkflowWire {
    id: String,
    name: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowsWire {
    items: Vec<WorkflowWire>,
}

#[derive(Debug, Deserialize)]
struct JobWire {
    name: String,
    #[serde(default)]
    job_number: Option<u64>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct JobsWire {
    items: Vec<JobWire>,
}

#[derive(Debug, Deserialize)]
struct TestWire {
    name: String,
    #[serde(default)]
    classname: Option<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    message: Option<String>,
    result: String,
}

#[derive(Debug, Deserialize)]
struct TestsWire {
    items: Vec<TestWire>,
}

#[derive(Debug, Deserialize)]
struct BuildWire {
    steps: Vec<StepWire>,
}

#[derive(Debug, Deserialize)]
struct StepWire {
    name: String,
    actions: Vec<ActionWire>,
}

#[derive(Debug, Deserialize)]
struct ActionWire {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    has_output: bool,
    #[serde(default)]
    output_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputMessageWire {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn spawn_mock(responses: Vec<(u16, &'static str)>) -> (String, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            for (status, body) in responses {
                if let Ok((mut stream, _)) = listener.accept() {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf);
                    let response = format!(
                        "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes());
                }
            }
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn project_slug_derives_from_ssh_remote() {
        let slug = CiClient::project_slug("git@github.com:acme/widgets.git").unwrap();
        assert_eq!(slug, "gh/acme/widgets");
    }

    #[test]
    fn project_slug_rejects_unparseable_remote() {
        assert!(CiClient::project_slug("not-a-url").is_err());
    }

    #[test]
    fn job_status_mapping_covers_common_states() {
        assert_eq!(job_status_from_str("success"), JobStatus::Success);
        assert_eq!(job_status_from_str("failed"), JobStatus::Failed);
        assert_eq!(job_status_from_str("infrastructure_fail"), JobStatus::Failed);
        assert_eq!(job_status_from_str("running"), JobStatus::Running);
        assert_eq!(job_status_from_str("canceled"), JobStatus::Cancelled);
        assert_eq!(job_status_from_str("on_hold"), JobStatus::Pending);
    }

    #[test]
    fn get_status_aggregates_pipeline_workflows_and_failed_job_tests() {
        let pipeline_body = r#"{"items":[{"id":"pipe-1","number":42}]}"#;
        let workflows_body = r#"{"items":[{"id":"wf-1","name":"build-and-test","status":"failed"}]}"#;
        let jobs_body = r#"{"items":[
            {"name":"unit-tests","job_number":7,"status":"failed"},
            {"name":"lint","job_number":8,"status":"success"}
        ]}"#;
        let tests_body = r#"{"items":[
            {"name":"test_login","classname":"AuthTests","file":"auth_test.py","message":"assert 1 == 2","result":"failure"},
            {"name":"test_logout","classname":"AuthTests","file":"auth_test.py","result":"success"}
        ]}"#;

        let (url, handle) = spawn_mock(vec![
            (200, pipeline_body),
            (200, workflows_body),
            (200, jobs_body),
            (200, tests_body),
        ]);
        let client = CiClient::with_urls(url, "http://unused", "token");

        let status = client.get_status("gh/acme/widgets", "feature/x").unwrap();
        assert_eq!(status.pipeline_number, 42);
        assert_eq!(status.workflows.len(), 1);
        assert_eq!(status.workflows[0].jobs.len(), 2);
        assert_eq!(status.failed_jobs.len(), 1);
        assert_eq!(status.failed_jobs[0].job_number, 7);
        assert_eq!(status.failed_jobs[0].failed_tests.len(), 1);
        assert_eq!(status.failed_jobs[0].failed_tests[0].name, "test_login");
        assert!(!status.all_green());
        handle.join().unwrap();
    }

    #[test]
    fn get_status_no_pipeline_for_branch_is_not_found() {
        let (url, handle) = spawn_mock(vec![(200, r#"{"items":[]}"#)]);
        let client = CiClient::with_urls(url, "http://unused", "token");

        let err = client.get_status("gh/acme/widgets", "no-such-branch").unwrap_err();
        assert!(matches!(err, VibeError::NotFound { .. }));
        handle.join().unwrap();
    }
}
