//! Per-tool argument construction.

use crate::config::{ToolConfig, ToolsConfig};
use crate::security::sanitizer::{
    InputSanitizer, RejectReason, RejectedInput, SanitizedCommandArgs,
};
use crate::tools::{ToolKind, ToolRequest};

/// Turns a validated [`ToolRequest`] into an argument vector.
pub trait ToolAdapter: Send + Sync {
    /// Executable and deadline for this tool.
    fn config<'a>(&self, tools: &'a ToolsConfig) -> &'a ToolConfig;

    /// Validate every field and build the argv. Fields the tool does not
    /// use must be absent.
    fn prepare(
        &self,
        request: &ToolRequest,
        sanitizer: &InputSanitizer,
    ) -> Result<SanitizedCommandArgs, RejectedInput>;
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, RejectedInput> {
    value
        .as_deref()
        .ok_or(RejectedInput::new(field, RejectReason::Missing))
}

fn absent(field: &'static str, value: &Option<String>) -> Result<(), RejectedInput> {
    match value {
        Some(_) => Err(RejectedInput::new(field, RejectReason::UnsupportedValue)),
        None => Ok(()),
    }
}

/// `nmap <fixed flags> <target>`
pub struct NmapAdapter;

impl ToolAdapter for NmapAdapter {
    fn config<'a>(&self, tools: &'a ToolsConfig) -> &'a ToolConfig {
        &tools.nmap
    }

    fn prepare(
        &self,
        request: &ToolRequest,
        sanitizer: &InputSanitizer,
    ) -> Result<SanitizedCommandArgs, RejectedInput> {
        absent("url", &request.url)?;
        absent("wordlist", &request.wordlist)?;

        let raw_target = required("target", &request.target)?;
        let target = sanitizer.target("target", raw_target)?;
        let scan_type = sanitizer.scan_type("scan_type", request.scan_type.as_deref())?;

        let mut args = SanitizedCommandArgs::new("nmap")
            .field("target", raw_target, target.to_string())
            .args(scan_type.nmap_flags().iter().copied())
            .arg(target.to_string());
        if let Some(raw) = request.scan_type.as_deref() {
            args = args.field("scan_type", raw, scan_type.as_str());
        }
        Ok(args)
    }
}

/// `gobuster dir -q -z -u <url> -w <registered wordlist>`
pub struct GobusterAdapter;

impl ToolAdapter for GobusterAdapter {
    fn config<'a>(&self, tools: &'a ToolsConfig) -> &'a ToolConfig {
        &tools.gobuster
    }

    fn prepare(
        &self,
        request: &ToolRequest,
        sanitizer: &InputSanitizer,
    ) -> Result<SanitizedCommandArgs, RejectedInput> {
        absent("target", &request.target)?;
        absent("scan_type", &request.scan_type)?;

        let raw_url = required("url", &request.url)?;
        let url = sanitizer.url("url", raw_url)?;
        let raw_wordlist = required("wordlist", &request.wordlist)?;
        let wordlist = sanitizer.wordlist("wordlist", raw_wordlist)?;

        let wordlist_path = wordlist.path.to_string_lossy().into_owned();
        Ok(SanitizedCommandArgs::new("gobuster")
            .field("url", raw_url, url.as_str())
            .field("wordlist", raw_wordlist, wordlist.id.clone())
            .args(["dir", "-q", "-z", "-u"])
            .arg(url.as_str())
            .arg("-w")
            .arg(wordlist_path))
    }
}

/// Adapter for `kind`.
pub fn adapter_for(kind: ToolKind) -> &'static dyn ToolAdapter {
    match kind {
        ToolKind::Nmap => &NmapAdapter,
        ToolKind::Gobuster => &GobusterAdapter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SanitizerConfig;

    fn sanitizer() -> InputSanitizer {
        InputSanitizer::new(&SanitizerConfig::default(), &ToolsConfig::default())
    }

    fn request(pairs: &[(&str, &str)]) -> ToolRequest {
        let mut req = ToolRequest::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "target" => req.target = v,
                "scan_type" => req.scan_type = v,
                "url" => req.url = v,
                "wordlist" => req.wordlist = v,
                _ => unreachable!(),
            }
        }
        req
    }

    #[test]
    fn test_nmap_argv() {
        let args = NmapAdapter
            .prepare(&request(&[("target", "8.8.8.8"), ("scan_type", "service")]), &sanitizer())
            .unwrap();
        assert_eq!(args.argv, vec!["-T4", "-sV", "8.8.8.8"]);
        assert_eq!(args.fields.len(), 2);
        assert_eq!(args.tool, "nmap");
    }

    #[test]
    fn test_nmap_default_scan_type() {
        let args = NmapAdapter
            .prepare(&request(&[("target", "scanme.nmap.org")]), &sanitizer())
            .unwrap();
        assert_eq!(args.argv, vec!["-T4", "-F", "scanme.nmap.org"]);
    }

    #[test]
    fn test_nmap_injection() {
        let err = NmapAdapter
            .prepare(
                &request(&[("target", "8.8.8.8; cat /etc/passwd"), ("scan_type", "quick")]),
                &sanitizer(),
            )
            .unwrap_err();
        assert_eq!(err.field, "target");
    }

    #[test]
    fn test_nmap_missing_and_foreign_fields() {
        let err = NmapAdapter.prepare(&request(&[]), &sanitizer()).unwrap_err();
        assert_eq!(err, RejectedInput::new("target", RejectReason::Missing));

        let err = NmapAdapter
            .prepare(&request(&[("target", "8.8.8.8"), ("wordlist", "common")]), &sanitizer())
            .unwrap_err();
        assert_eq!(err.field, "wordlist");
    }

    #[test]
    fn test_gobuster_argv() {
        let args = GobusterAdapter
            .prepare(
                &request(&[("url", "http://example.com"), ("wordlist", "common")]),
                &sanitizer(),
            )
            .unwrap();
        assert_eq!(
            args.argv,
            vec![
                "dir",
                "-q",
                "-z",
                "-u",
                "http://example.com/",
                "-w",
                "/usr/share/wordlists/dirb/common.txt"
            ]
        );
    }

    #[test]
    fn test_gobuster_injection_and_paths() {
        let s = sanitizer();
        let err = GobusterAdapter
            .prepare(
                &request(&[
                    ("url", "http://example.com && curl attacker.com"),
                    ("wordlist", "common"),
                ]),
                &s,
            )
            .unwrap_err();
        assert_eq!(err.field, "url");

        let err = GobusterAdapter
            .prepare(
                &request(&[
                    ("url", "http://example.com"),
                    ("wordlist", "/usr/share/wordlists/dirb/common.txt"),
                ]),
                &s,
            )
            .unwrap_err();
        assert_eq!(err.field, "wordlist");
    }
}
