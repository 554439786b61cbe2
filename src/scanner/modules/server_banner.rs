//! Server banner/technology disclosure

use regex::Regex;

use crate::error::ModuleError;
use crate::http::Response;
use crate::scanner::alerts::{Alert, Severity};
use crate::scanner::module::{ModuleContext, ModuleDescriptor, ScanModule};

pub const MODULE_NAME: &str = "vinfo-server-banner";

/// Response processor reporting headers that disclose server software versions
pub struct ServerBannerModule {
    descriptor: ModuleDescriptor,
    version_pattern: Option<Regex>,
}

impl ServerBannerModule {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::response_processor(
                MODULE_NAME,
                "Server Banner Disclosure",
            ),
            version_pattern: Regex::new(r"\d+\.\d+(?:\.\d+)?").ok(),
        }
    }

    /// Header lines that disclose technology details, in a fixed order
    pub fn analyze(&self, response: &Response) -> Vec<String> {
        let mut evidence = Vec::new();

        if let Some(server) = response.header("server") {
            let versioned = self
                .version_pattern
                .as_ref()
                .map(|p| p.is_match(server))
                .unwrap_or(false);
            if versioned {
                evidence.push(format!("Server: {}", server));
            }
        }

        if let Some(powered_by) = response.header("x-powered-by") {
            evidence.push(format!("X-Powered-By: {}", powered_by));
        }

        if let Some(aspnet) = response.header("x-aspnet-version") {
            evidence.push(format!("X-AspNet-Version: {}", aspnet));
        }

        evidence
    }
}

impl Default for ServerBannerModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanModule for ServerBannerModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn run(&self, ctx: &ModuleContext<'_>) -> Result<(), ModuleError> {
        let transaction = ctx.transaction();
        let evidence = self.analyze(transaction.response());
        if evidence.is_empty() {
            return Ok(());
        }

        let output = evidence.join("\n");
        let host = transaction.host().unwrap_or_default();

        // Same banner on every page of a host is one issue
        ctx.publish_alert(
            Alert::builder(MODULE_NAME, transaction)
                .key(&format!("{}:{}:{}", MODULE_NAME, host, output))
                .severity(Severity::Low)
                .message("Response headers disclose server technology and version")
                .field("output", output)
                .build(),
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Transaction};
    use crate::scanner::sink::{AlertSink, DedupeSink, MemorySink};
    use std::sync::Arc;

    fn banner_page(url: &str) -> Arc<Transaction> {
        Arc::new(Transaction::new(
            Request::new("GET", url),
            Response::new(200, "<html></html>").with_header("Server", "nginx/1.18.0"),
        ))
    }

    fn run_on(module: &ServerBannerModule, tx: &Arc<Transaction>, sink: &dyn AlertSink) {
        let ctx = ModuleContext::new(MODULE_NAME, tx, sink);
        module.run(&ctx).unwrap();
    }

    #[test]
    fn test_analyze_server_header() {
        let module = ServerBannerModule::new();

        let response = Response::new(200, "").with_header("Server", "Apache/2.4.41 (Ubuntu)");
        assert_eq!(module.analyze(&response), vec!["Server: Apache/2.4.41 (Ubuntu)"]);

        let response = Response::new(200, "").with_header("Server", "cloudflare");
        assert!(module.analyze(&response).is_empty());
    }

    #[test]
    fn test_analyze_framework_headers() {
        let module = ServerBannerModule::new();
        let response = Response::new(200, "")
            .with_header("X-Powered-By", "PHP/8.1.2")
            .with_header("X-AspNet-Version", "4.0.30319");

        assert_eq!(
            module.analyze(&response),
            vec!["X-Powered-By: PHP/8.1.2", "X-AspNet-Version: 4.0.30319"]
        );
    }

    #[test]
    fn test_run_publishes_keyed_low_severity_alert() {
        let module = ServerBannerModule::new();
        let sink = MemorySink::new();
        let tx = banner_page("https://example.com/index.php");

        run_on(&module, &tx, &sink);

        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.source_module(), MODULE_NAME);
        assert_eq!(alert.severity(), Severity::Low);
        assert_eq!(alert.field("output"), Some("Server: nginx/1.18.0"));
        assert_eq!(
            alert.key(),
            Some("vinfo-server-banner:example.com:Server: nginx/1.18.0")
        );
    }

    #[test]
    fn test_run_without_disclosure_publishes_nothing() {
        let module = ServerBannerModule::new();
        let sink = MemorySink::new();
        let tx = Arc::new(Transaction::new(
            Request::new("GET", "https://example.com/"),
            Response::new(200, "<html></html>").with_header("Server", "cloudflare"),
        ));

        run_on(&module, &tx, &sink);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_same_banner_is_reported_once_per_host() {
        let module = ServerBannerModule::new();
        let memory = Arc::new(MemorySink::new());
        let sink = DedupeSink::new(memory.clone());

        run_on(&module, &banner_page("https://a.example.com/"), &sink);
        run_on(&module, &banner_page("https://a.example.com/login"), &sink);
        run_on(&module, &banner_page("https://b.example.com/"), &sink);

        assert_eq!(memory.len(), 2);
        assert_eq!(sink.duplicates(), 1);
    }
}
