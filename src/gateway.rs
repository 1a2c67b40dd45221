//! Blocking text-generation gateway.
//!
//! One [`TextGenerator::generate`] call issues exactly one request; there is
//! no internal retry. Failures come back as a typed [`GatewayError`] so that
//! callers can tell "the model said nothing" (`Ok("")`) apart from "the
//! model could not be reached".
//!
//! With auto-tune enabled, generation parameters come from a fixed tier
//! table keyed by the detected [`HardwareProfile`]. Remote or tunnelled
//! endpoints always get six times the timeout and no thread pinning, since
//! the local hardware says nothing about theirs.

use std::{fs, path::Path, time::Duration};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

pub const REMOTE_TIMEOUT_MULTIPLIER: u32 = 6;

const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1", "[::1]", "0.0.0.0"];
const TUNNEL_MARKERS: &[&str] = &[
    "ngrok",
    "trycloudflare",
    "cloudflared",
    "loca.lt",
    "localtunnel",
    "serveo",
    "tunnel",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("model request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("could not reach model endpoint {endpoint}: {message}")]
    Connection { endpoint: String, message: String },
    #[error("model endpoint returned HTTP status {status}")]
    Status { status: u16 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub num_predict: u32,
    pub num_ctx: u32,
    pub top_k: u32,
    pub top_p: f32,
    pub timeout_secs: u64,
    pub auto_tune: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            temperature: 0.3,
            num_predict: 512,
            num_ctx: 4096,
            top_k: 40,
            top_p: 0.9,
            timeout_secs: 120,
            auto_tune: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub num_predict: u32,
    pub num_ctx: u32,
    pub top_k: u32,
    pub top_p: f32,
    pub timeout: Duration,
    pub auto_tune: bool,
}

impl GenerationRequest {
    pub fn from_config(prompt: impl Into<String>, config: &GatewayConfig) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: config.temperature,
            num_predict: config.num_predict,
            num_ctx: config.num_ctx,
            top_k: config.top_k,
            top_p: config.top_p,
            timeout: Duration::from_secs(config.timeout_secs),
            auto_tune: config.auto_tune,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn num_predict(mut self, num_predict: u32) -> Self {
        self.num_predict = num_predict;
        self
    }

    pub fn num_ctx(mut self, num_ctx: u32) -> Self {
        self.num_ctx = num_ctx;
        self
    }

    pub fn auto_tune(mut self, auto_tune: bool) -> Self {
        self.auto_tune = auto_tune;
        self
    }
}

pub trait TextGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for &T {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        (**self).generate(request)
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        (**self).generate(request)
    }
}

/// Gateway used when model calls are disabled; every call is a connection failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGateway;

impl TextGenerator for OfflineGateway {
    fn generate(&self, _request: &GenerationRequest) -> Result<String, GatewayError> {
        Err(GatewayError::Connection {
            endpoint: "offline".into(),
            message: "model calls are disabled".into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HardwareProfile {
    pub cpus: usize,
    pub memory_gib: Option<f64>,
    pub gpu: bool,
}

impl HardwareProfile {
    pub fn detect() -> Self {
        Self {
            cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            memory_gib: available_memory_gib(),
            gpu: gpu_present(),
        }
    }

    pub fn tier(&self) -> ResourceTier {
        let memory = self.memory_gib.unwrap_or(8.0);
        if self.gpu || (self.cpus >= 16 && memory >= 32.0) {
            ResourceTier::High
        } else if self.cpus >= 8 && memory >= 16.0 {
            ResourceTier::Medium
        } else {
            ResourceTier::Low
        }
    }
}

fn available_memory_gib() -> Option<f64> {
    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    let field = |name: &str| {
        meminfo
            .lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<f64>().ok())
    };
    field("MemAvailable:")
        .or_else(|| field("MemTotal:"))
        .map(|kb| kb / (1024.0 * 1024.0))
}

fn gpu_present() -> bool {
    if let Ok(devices) = std::env::var("CUDA_VISIBLE_DEVICES") {
        let devices = devices.trim();
        if !devices.is_empty() && devices != "-1" {
            return true;
        }
    }
    cfg!(all(target_os = "macos", target_arch = "aarch64"))
        || Path::new("/dev/nvidia0").exists()
        || Path::new("/proc/driver/nvidia/version").exists()
        || Path::new("/dev/kfd").exists()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceTier {
    High,
    Medium,
    Low,
}

struct TierSpec {
    tier: ResourceTier,
    num_ctx: u32,
    num_predict: u32,
    max_threads: usize,
    num_batch: u32,
    timeout_secs: u64,
}

const TIER_TABLE: [TierSpec; 3] = [
    TierSpec {
        tier: ResourceTier::High,
        num_ctx: 8192,
        num_predict: 1024,
        max_threads: 16,
        num_batch: 512,
        timeout_secs: 30,
    },
    TierSpec {
        tier: ResourceTier::Medium,
        num_ctx: 4096,
        num_predict: 768,
        max_threads: 8,
        num_batch: 256,
        timeout_secs: 60,
    },
    TierSpec {
        tier: ResourceTier::Low,
        num_ctx: 2048,
        num_predict: 512,
        max_threads: 4,
        num_batch: 128,
        timeout_secs: 120,
    },
];

/// Parameters actually sent for one request after tuning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveParams {
    pub num_ctx: u32,
    pub num_predict: u32,
    pub num_thread: Option<usize>,
    pub num_batch: Option<u32>,
    pub timeout: Duration,
    pub remote: bool,
    pub tier: Option<ResourceTier>,
}

pub fn effective_params(
    request: &GenerationRequest,
    hardware: &HardwareProfile,
    endpoint: &str,
) -> EffectiveParams {
    let remote = is_remote_endpoint(endpoint);
    let mut params = if request.auto_tune {
        let tier = hardware.tier();
        let spec = TIER_TABLE
            .iter()
            .find(|spec| spec.tier == tier)
            .unwrap_or(&TIER_TABLE[2]);
        EffectiveParams {
            num_ctx: spec.num_ctx,
            num_predict: spec.num_predict,
            num_thread: (!remote).then(|| hardware.cpus.clamp(1, spec.max_threads)),
            num_batch: Some(spec.num_batch),
            timeout: Duration::from_secs(spec.timeout_secs),
            remote,
            tier: Some(tier),
        }
    } else {
        EffectiveParams {
            num_ctx: request.num_ctx,
            num_predict: request.num_predict,
            num_thread: None,
            num_batch: None,
            timeout: request.timeout,
            remote,
            tier: None,
        }
    };
    if remote {
        params.timeout *= REMOTE_TIMEOUT_MULTIPLIER;
    }
    params
}

/// Anything other than a loopback host, or any host naming a tunnel service, is remote.
pub fn is_remote_endpoint(endpoint: &str) -> bool {
    let without_scheme = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest);
    let authority = without_scheme.split('/').next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = if authority.starts_with('[') {
        authority
            .find(']')
            .map_or(authority, |end| &authority[..=end])
    } else {
        authority.split(':').next().unwrap_or_default()
    }
    .to_ascii_lowercase();
    if TUNNEL_MARKERS.iter().any(|marker| host.contains(marker)) {
        return true;
    }
    !(LOCAL_HOSTS.contains(&host.as_str()) || host.starts_with("127."))
}

/// Client for an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaGateway {
    config: GatewayConfig,
    hardware: HardwareProfile,
}

impl OllamaGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_hardware(config, HardwareProfile::detect())
    }

    pub fn with_hardware(config: GatewayConfig, hardware: HardwareProfile) -> Self {
        Self { config, hardware }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn hardware(&self) -> &HardwareProfile {
        &self.hardware
    }

    pub fn payload(
        &self,
        request: &GenerationRequest,
        params: &EffectiveParams,
    ) -> serde_json::Value {
        let mut options = json!({
            "temperature": request.temperature,
            "num_predict": params.num_predict,
            "num_ctx": params.num_ctx,
            "top_k": request.top_k,
            "top_p": request.top_p,
        });
        if let Some(threads) = params.num_thread {
            options["num_thread"] = json!(threads);
        }
        if let Some(batch) = params.num_batch {
            options["num_batch"] = json!(batch);
        }
        json!({
            "model": self.config.model,
            "prompt": request.prompt,
            "stream": false,
            "options": options,
        })
    }
}

impl std::fmt::Debug for OllamaGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaGateway")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .field("tier", &self.hardware.tier())
            .finish()
    }
}

impl TextGenerator for OllamaGateway {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        let params = effective_params(request, &self.hardware, &self.config.endpoint);
        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        let timeout_secs = params.timeout.as_secs();
        debug!(
            "POST {url} (ctx={}, predict={}, threads={:?}, timeout={}s)",
            params.num_ctx, params.num_predict, params.num_thread, timeout_secs
        );
        let agent = ureq::AgentBuilder::new().timeout(params.timeout).build();
        let body = self.payload(request, &params).to_string();

        let response = match agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(GatewayError::Status { status });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(if transport_timed_out(&transport) {
                    GatewayError::Timeout { timeout_secs }
                } else {
                    GatewayError::Connection {
                        endpoint: self.config.endpoint.clone(),
                        message: transport.to_string(),
                    }
                });
            }
        };
        if response.status() != 200 {
            return Err(GatewayError::Status {
                status: response.status(),
            });
        }

        let text = response.into_string().map_err(|err| {
            if matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                GatewayError::Timeout { timeout_secs }
            } else {
                GatewayError::Connection {
                    endpoint: self.config.endpoint.clone(),
                    message: format!("reading response body: {err}"),
                }
            }
        })?;
        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|err| GatewayError::Connection {
                endpoint: self.config.endpoint.clone(),
                message: format!("response body is not JSON: {err}"),
            })?;
        match json.get("response").and_then(|v| v.as_str()) {
            Some(text) => Ok(text.to_string()),
            None => {
                warn!("Model response from {url} carried no text field");
                Ok(String::new())
            }
        }
    }
}

fn transport_timed_out(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        {
            return true;
        }
        source = err.source();
    }
    transport.to_string().to_ascii_lowercase().contains("timed out")
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::{TcpListener, TcpStream},
        thread,
    };

    use super::*;

    /// Serves a single connection on a loopback port and returns its base URL.
    fn stub_server(handle: impl FnOnce(TcpStream) + Send + 'static) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub");
        let addr = listener.local_addr().expect("stub address");
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                handle(stream);
            }
        });
        format!("http://{addr}")
    }

    fn read_request(stream: &TcpStream) {
        let mut reader = BufReader::new(stream);
        let mut content_length = 0usize;
        let mut line = String::new();
        while reader.read_line(&mut line).is_ok_and(|n| n > 0) {
            if line.trim().is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = value.trim().parse().unwrap_or(0);
            }
            line.clear();
        }
        let mut body = vec![0; content_length];
        let _ = reader.read_exact(&mut body);
    }

    fn respond(
        status_line: &'static str,
        body: &'static str,
    ) -> impl FnOnce(TcpStream) + Send + 'static {
        move |mut stream| {
            read_request(&stream);
            let reply = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(reply.as_bytes());
        }
    }

    fn local_gateway(endpoint: String, timeout_secs: u64) -> OllamaGateway {
        let config = GatewayConfig {
            endpoint,
            timeout_secs,
            ..GatewayConfig::default()
        };
        OllamaGateway::with_hardware(config, profile(4, 8.0, false))
    }

    fn request_for(gateway: &OllamaGateway) -> GenerationRequest {
        GenerationRequest::from_config("hello", gateway.config())
    }

    fn profile(cpus: usize, memory_gib: f64, gpu: bool) -> HardwareProfile {
        HardwareProfile {
            cpus,
            memory_gib: Some(memory_gib),
            gpu,
        }
    }

    fn request(auto_tune: bool) -> GenerationRequest {
        GenerationRequest::from_config("hello", &GatewayConfig::default()).auto_tune(auto_tune)
    }

    #[test]
    fn tiers_follow_hardware_class() {
        assert_eq!(profile(4, 8.0, true).tier(), ResourceTier::High);
        assert_eq!(profile(32, 64.0, false).tier(), ResourceTier::High);
        assert_eq!(profile(8, 16.0, false).tier(), ResourceTier::Medium);
        assert_eq!(profile(8, 8.0, false).tier(), ResourceTier::Low);
        assert_eq!(profile(2, 64.0, false).tier(), ResourceTier::Low);
    }

    #[test]
    fn loopback_hosts_are_local() {
        assert!(!is_remote_endpoint("http://localhost:11434"));
        assert!(!is_remote_endpoint("http://127.0.0.1:11434/"));
        assert!(!is_remote_endpoint("http://[::1]:11434"));
        assert!(is_remote_endpoint("https://abc123.ngrok-free.app"));
        assert!(is_remote_endpoint("https://gpu-box.example.com:11434"));
        assert!(is_remote_endpoint("https://localhost.trycloudflare.com"));
    }

    #[test]
    fn auto_tune_uses_tier_table_locally() {
        let hardware = profile(12, 24.0, false);
        let params = effective_params(&request(true), &hardware, "http://localhost:11434");
        assert_eq!(params.tier, Some(ResourceTier::Medium));
        assert_eq!(params.num_ctx, 4096);
        assert_eq!(params.num_thread, Some(8));
        assert_eq!(params.num_batch, Some(256));
        assert_eq!(params.timeout, Duration::from_secs(60));
        assert!(!params.remote);
    }

    #[test]
    fn remote_endpoints_get_six_times_the_timeout() {
        let hardware = profile(2, 4.0, false);
        let params = effective_params(&request(true), &hardware, "https://x.ngrok.io");
        assert_eq!(params.tier, Some(ResourceTier::Low));
        assert_eq!(params.timeout, Duration::from_secs(720));
        assert_eq!(params.num_thread, None);

        let manual = effective_params(&request(false), &hardware, "https://x.ngrok.io");
        assert_eq!(manual.timeout, Duration::from_secs(120 * 6));
        assert_eq!(manual.num_ctx, 4096);
        assert_eq!(manual.num_batch, None);
    }

    #[test]
    fn payload_carries_tuned_options() {
        let gateway =
            OllamaGateway::with_hardware(GatewayConfig::default(), profile(32, 64.0, false));
        let req = request(true);
        let params = effective_params(&req, gateway.hardware(), &gateway.config().endpoint);
        let payload = gateway.payload(&req, &params);
        assert_eq!(payload["model"], "llama3.2");
        assert_eq!(payload["stream"], false);
        assert_eq!(payload["options"]["num_ctx"], 8192);
        assert_eq!(payload["options"]["num_thread"], 16);
    }

    #[test]
    fn offline_gateway_always_fails_to_connect() {
        let err = OfflineGateway.generate(&request(false)).unwrap_err();
        assert!(matches!(err, GatewayError::Connection { .. }));
    }

    #[test]
    fn unreachable_endpoint_is_a_connection_failure() {
        let config = GatewayConfig {
            endpoint: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..GatewayConfig::default()
        };
        let gateway = OllamaGateway::with_hardware(config, profile(4, 8.0, false));
        match gateway.generate(&request(false)) {
            Err(GatewayError::Connection { .. }) | Err(GatewayError::Timeout { .. }) => {}
            other => panic!("expected a transport failure, got {other:?}"),
        }
    }

    #[test]
    fn successful_reply_yields_the_response_text() {
        let endpoint = stub_server(respond("200 OK", r#"{"response": "hi", "done": true}"#));
        let gateway = local_gateway(endpoint, 5);
        assert_eq!(gateway.generate(&request_for(&gateway)), Ok("hi".to_string()));
    }

    #[test]
    fn reply_without_text_field_is_empty() {
        let endpoint = stub_server(respond("200 OK", r#"{"done": true}"#));
        let gateway = local_gateway(endpoint, 5);
        assert_eq!(gateway.generate(&request_for(&gateway)), Ok(String::new()));
    }

    #[test]
    fn error_status_is_reported_as_status() {
        let endpoint = stub_server(respond("503 Service Unavailable", r#"{"error": "loading"}"#));
        let gateway = local_gateway(endpoint, 5);
        assert_eq!(
            gateway.generate(&request_for(&gateway)),
            Err(GatewayError::Status { status: 503 })
        );
    }

    #[test]
    fn stalled_endpoint_is_reported_as_timeout() {
        let endpoint = stub_server(|stream| {
            read_request(&stream);
            thread::sleep(Duration::from_secs(3));
            drop(stream);
        });
        let gateway = local_gateway(endpoint, 1);
        assert_eq!(
            gateway.generate(&request_for(&gateway)),
            Err(GatewayError::Timeout { timeout_secs: 1 })
        );
    }
}
