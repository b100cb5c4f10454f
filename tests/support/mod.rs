#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use harvester::{Cycle, HarvestConfig, RunSummary, run_cycle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const DEFAULT_DATESTAMP: &str = "2024-03-01";
pub const OAI_NS: &str = "http://www.openarchives.org/OAI/2.0/";

#[derive(Clone)]
pub struct RecordSpec {
    pub identifier: String,
    pub datestamp: String,
    pub payload: String,
    pub deleted: bool,
}

pub fn record_spec(identifier: &str, payload: &str) -> RecordSpec {
    RecordSpec {
        identifier: identifier.to_string(),
        datestamp: DEFAULT_DATESTAMP.to_string(),
        payload: payload.to_string(),
        deleted: false,
    }
}

pub fn deleted_record_spec(identifier: &str) -> RecordSpec {
    RecordSpec {
        identifier: identifier.to_string(),
        datestamp: DEFAULT_DATESTAMP.to_string(),
        payload: String::new(),
        deleted: true,
    }
}

/// Render a record element exactly the same way for live responses and
/// static archives, so the two source kinds produce identical output.
pub fn record_xml(spec: &RecordSpec) -> String {
    if spec.deleted {
        format!(
            r#"<record xmlns="{OAI_NS}"><header status="deleted"><identifier>{}</identifier><datestamp>{}</datestamp></header></record>"#,
            spec.identifier, spec.datestamp
        )
    } else {
        format!(
            r#"<record xmlns="{OAI_NS}"><header><identifier>{}</identifier><datestamp>{}</datestamp></header><metadata>{}</metadata></record>"#,
            spec.identifier, spec.datestamp, spec.payload
        )
    }
}

#[derive(Clone)]
pub struct MockOaiConfig {
    pub prefixes: Vec<String>,
    pub records: Vec<RecordSpec>,
    /// Records per ListIdentifiers/ListRecords page; 0 means one page.
    pub page_size: usize,
    /// Simulated processing time per request.
    pub delay: Option<Duration>,
}

impl Default for MockOaiConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["oai_dc".to_string()],
            records: Vec::new(),
            page_size: 0,
            delay: None,
        }
    }
}

#[derive(Default)]
pub struct ServerStats {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: AtomicUsize,
}

impl ServerStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockOaiServer {
    pub endpoint: String,
    pub stats: Arc<ServerStats>,
    handle: JoinHandle<()>,
}

impl Drop for MockOaiServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn start_mock_oai_server(config: MockOaiConfig) -> anyhow::Result<MockOaiServer> {
    start_mock_oai_server_with_stats(config, ServerStats::new()).await
}

pub async fn start_mock_oai_server_with_stats(
    config: MockOaiConfig,
    stats: Arc<ServerStats>,
) -> anyhow::Result<MockOaiServer> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let endpoint = format!("http://{}", address);
    let endpoint_for_task = endpoint.clone();
    let shared_config = Arc::new(config);
    let shared_stats = stats.clone();

    let handle = tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(value) => value,
                Err(_) => break,
            };
            let endpoint = endpoint_for_task.clone();
            let config = shared_config.clone();
            let stats = shared_stats.clone();
            tokio::spawn(async move {
                if let Err(error) = handle_connection(&mut socket, &endpoint, &config, &stats).await
                {
                    eprintln!("mock OAI server request handling failed: {}", error);
                }
            });
        }
    });

    Ok(MockOaiServer {
        endpoint,
        stats,
        handle,
    })
}

async fn handle_connection(
    socket: &mut TcpStream,
    endpoint: &str,
    config: &MockOaiConfig,
    stats: &ServerStats,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; 8192];
    let mut total = 0usize;

    loop {
        let bytes_read = socket.read(&mut buf[total..]).await?;
        if bytes_read == 0 {
            return Ok(());
        }
        total += bytes_read;
        if buf[..total].windows(4).any(|window| window == b"\r\n\r\n") {
            break;
        }
        if total == buf.len() {
            break;
        }
    }

    stats.enter();
    if let Some(delay) = config.delay {
        tokio::time::sleep(delay).await;
    }

    let request = String::from_utf8_lossy(&buf[..total]);
    let request_line = request.lines().next().unwrap_or_default();
    let path = request_line.split_whitespace().nth(1).unwrap_or("/");
    let params = parse_query_params(path);
    let body = build_oai_response(endpoint, config, &params);
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/xml; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );

    let result = socket.write_all(response.as_bytes()).await;
    stats.leave();
    result?;
    Ok(())
}

fn parse_query_params(path: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let query = path.split_once('?').map(|(_, query)| query).unwrap_or("");
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(key.to_string(), percent_decode(value));
    }
    params
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'%' if index + 3 <= bytes.len() => {
                let hex = std::str::from_utf8(&bytes[index + 1..index + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        out.push(byte);
                        index += 3;
                    }
                    Err(_) => {
                        out.push(b'%');
                        index += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                index += 1;
            }
            byte => {
                out.push(byte);
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn build_oai_response(
    endpoint: &str,
    config: &MockOaiConfig,
    params: &HashMap<String, String>,
) -> String {
    match params.get("verb").map(|value| value.as_str()) {
        Some("Identify") => identify_response(endpoint),
        Some("ListMetadataFormats") => list_metadata_formats_response(endpoint, &config.prefixes),
        Some("ListIdentifiers") => list_page_response(endpoint, config, params, false),
        Some("ListRecords") => list_page_response(endpoint, config, params, true),
        Some("GetRecord") => get_record_response(endpoint, config, params),
        _ => error_response(endpoint, "badVerb", "Unknown or missing verb"),
    }
}

fn identify_response(endpoint: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="{OAI_NS}">
  <responseDate>2024-03-01T00:00:00Z</responseDate>
  <request verb="Identify">{endpoint}</request>
  <Identify>
    <repositoryName>Integration Test Repository</repositoryName>
    <baseURL>{endpoint}</baseURL>
    <protocolVersion>2.0</protocolVersion>
    <granularity>YYYY-MM-DDThh:mm:ssZ</granularity>
  </Identify>
</OAI-PMH>"#
    )
}

fn list_metadata_formats_response(endpoint: &str, prefixes: &[String]) -> String {
    let formats = prefixes
        .iter()
        .map(|prefix| {
            format!("<metadataFormat><metadataPrefix>{prefix}</metadataPrefix></metadataFormat>")
        })
        .collect::<Vec<_>>()
        .join("");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="{OAI_NS}">
  <responseDate>2024-03-01T00:00:00Z</responseDate>
  <request verb="ListMetadataFormats">{endpoint}</request>
  <ListMetadataFormats>{formats}</ListMetadataFormats>
</OAI-PMH>"#
    )
}

fn list_page_response(
    endpoint: &str,
    config: &MockOaiConfig,
    params: &HashMap<String, String>,
    with_records: bool,
) -> String {
    let verb = if with_records {
        "ListRecords"
    } else {
        "ListIdentifiers"
    };
    if config.records.is_empty() {
        return error_response(endpoint, "noRecordsMatch", "The repository is empty");
    }

    let page_size = if config.page_size == 0 {
        config.records.len()
    } else {
        config.page_size
    };
    let page: usize = params
        .get("resumptionToken")
        .and_then(|token| token.strip_prefix("page-"))
        .and_then(|number| number.parse().ok())
        .unwrap_or(0);
    let pages: Vec<&[RecordSpec]> = config.records.chunks(page_size).collect();
    let chunk = pages.get(page).copied().unwrap_or_default();

    let items = chunk
        .iter()
        .map(|spec| {
            if with_records {
                record_xml(spec)
            } else if spec.deleted {
                format!(
                    r#"<header status="deleted"><identifier>{}</identifier><datestamp>{}</datestamp></header>"#,
                    spec.identifier, spec.datestamp
                )
            } else {
                format!(
                    "<header><identifier>{}</identifier><datestamp>{}</datestamp></header>",
                    spec.identifier, spec.datestamp
                )
            }
        })
        .collect::<Vec<_>>()
        .join("");
    let token = if page + 1 < pages.len() {
        format!("<resumptionToken>page-{}</resumptionToken>", page + 1)
    } else {
        String::new()
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="{OAI_NS}">
  <responseDate>2024-03-01T00:00:00Z</responseDate>
  <request verb="{verb}">{endpoint}</request>
  <{verb}>{items}{token}</{verb}>
</OAI-PMH>"#
    )
}

fn get_record_response(
    endpoint: &str,
    config: &MockOaiConfig,
    params: &HashMap<String, String>,
) -> String {
    let identifier = params
        .get("identifier")
        .map(String::as_str)
        .unwrap_or_default();
    match config
        .records
        .iter()
        .find(|spec| spec.identifier == identifier && !spec.deleted)
    {
        Some(spec) => format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="{OAI_NS}">
  <responseDate>2024-03-01T00:00:00Z</responseDate>
  <request verb="GetRecord" identifier="{identifier}">{endpoint}</request>
  <GetRecord>{}</GetRecord>
</OAI-PMH>"#,
            record_xml(spec)
        ),
        None => error_response(endpoint, "idDoesNotExist", "No such record"),
    }
}

fn error_response(endpoint: &str, code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="{OAI_NS}">
  <responseDate>2024-03-01T00:00:00Z</responseDate>
  <request>{endpoint}</request>
  <error code="{code}">{message}</error>
</OAI-PMH>"#
    )
}

/// Static-repository archive holding the exact same record elements a
/// mock server would serve.
pub fn static_archive_xml(prefix: &str, records: &[RecordSpec]) -> String {
    let formats =
        format!("<metadataFormat><metadataPrefix>{prefix}</metadataPrefix></metadataFormat>");
    let records = records
        .iter()
        .filter(|spec| !spec.deleted)
        .map(record_xml)
        .collect::<Vec<_>>()
        .join("");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Repository>
  <ListMetadataFormats>{formats}</ListMetadataFormats>
  <ListRecords metadataPrefix="{prefix}">{records}</ListRecords>
</Repository>"#
    )
}

/// Load a config from XML, build the cycle on `dir/overview.xml` and run
/// one full cycle.
pub async fn run_harvest_cycle(
    dir: &Path,
    config_xml: &str,
) -> anyhow::Result<(RunSummary, Arc<Cycle>)> {
    let config_path = dir.join("config.xml");
    std::fs::write(&config_path, config_xml)?;
    let config = Arc::new(HarvestConfig::load(&config_path)?);
    let cycle = Arc::new(Cycle::load(
        dir.join("overview.xml"),
        config.properties.clone(),
        &config.providers,
    )?);
    let shutdown = Arc::new(AtomicBool::new(false));
    let summary = run_cycle(cycle.clone(), config, shutdown).await?;
    Ok((summary, cycle))
}

/// All saved record files under an output root, as (relative path,
/// contents), sorted.
pub fn collect_output_tree(root: &Path) -> Vec<(String, String)> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files);
    files.sort();
    files
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<(String, String)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, files);
        } else {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            let contents = std::fs::read_to_string(&path).unwrap_or_default();
            files.push((relative, contents));
        }
    }
}
