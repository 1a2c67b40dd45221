#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv_insights::dataset::Dataset;
use csv_insights::gateway::{GatewayError, GenerationRequest, TextGenerator};
use tempfile::{TempDir, tempdir};

const NATIONALITIES: &[&str] = &[
    "Emirati", "Indian", "Egyptian", "Pakistani", "Jordanian", "British", "Syrian", "Filipino",
];
const PROGRAMS: &[&str] = &["Business", "Engineering", "Medicine", "Law", "Design"];

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn dataset_from_rows(headers: &[&str], rows: &[Vec<String>]) -> Dataset {
    Dataset::from_raw(
        headers.iter().map(|h| h.to_string()).collect(),
        rows.to_vec(),
    )
    .expect("build dataset")
}

/// Deterministic student records as CSV text.
pub fn student_csv(rows: usize) -> String {
    let mut csv = String::from(
        "Student ID,Cumulative GPA,Scholarship Amount,Tuition Revenue,Nationality,Program,Gender\n",
    );
    for i in 0..rows {
        let gpa = match i % 20 {
            0 => 0.0,
            1 => 4.0,
            n => 1.5 + (n as f64) * 0.12,
        };
        let aid = if i % 3 == 0 { 0 } else { 5_000 + (i % 7) * 2_500 };
        let tuition = 60_000 + (i % 5) * 5_000;
        let nationality = NATIONALITIES[(i * i + i / 3) % NATIONALITIES.len()];
        let program = PROGRAMS[i % PROGRAMS.len()];
        let gender = if i % 2 == 0 { "F" } else { "M" };
        csv.push_str(&format!(
            "S{i:05},{gpa:.2},{aid},{tuition},{nationality},{program},{gender}\n"
        ));
    }
    csv
}

pub fn student_dataset(rows: usize) -> Dataset {
    let text = student_csv(rows);
    let mut lines = text.lines();
    let headers = lines
        .next()
        .expect("header line")
        .split(',')
        .map(str::to_string)
        .collect();
    let raw_rows = lines
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect();
    Dataset::from_raw(headers, raw_rows).expect("build dataset")
}

/// Replays canned replies in order; once they run out every call times out.
pub struct ScriptedGateway {
    replies: RefCell<VecDeque<Result<String, GatewayError>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, GatewayError>>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn always(reply: &str, times: usize) -> Self {
        Self::new((0..times).map(|_| Ok(reply.to_string())))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl TextGenerator for ScriptedGateway {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(GatewayError::Timeout { timeout_secs: 1 }))
    }
}

/// Every call times out.
#[derive(Default)]
pub struct FailingGateway {
    calls: Cell<usize>,
}

impl FailingGateway {
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl TextGenerator for FailingGateway {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        self.calls.set(self.calls.get() + 1);
        Err(GatewayError::Timeout {
            timeout_secs: request.timeout.as_secs(),
        })
    }
}
