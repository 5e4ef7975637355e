//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sidecar_pki::{
    CertificateProfile, IssuanceReport, KeyUsage, ProfileSet, Scope, VerificationReport,
};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

impl TableDisplay for IssuanceReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Issued certificates for {}", scope_label(&self.scope))?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Directory:        {}", self.path.display())?;
        writeln!(writer)?;
        writeln!(writer, "Certificate Authority")?;
        writeln!(writer, "  Subject:        {}", self.ca_subject)?;
        writeln!(writer, "  Status:         {}", self.ca_outcome)?;
        writeln!(writer)?;
        writeln!(writer, "Leaf")?;
        writeln!(writer, "  Subject:        {}", self.leaf_subject)?;
        writeln!(writer, "  Serial:         {}", self.leaf_serial)?;
        writeln!(writer, "  Expires:        {}", date(self.leaf_not_after))?;
        writeln!(writer)?;
        writeln!(writer, "Written")?;
        for artifact in &self.artifacts {
            writeln!(writer, "  {}", artifact.display())?;
        }
        writeln!(writer)?;
        writeln!(
            writer,
            "Generated new certs for {} for k8s-sidecar-injector",
            scope_label(&self.scope)
        )?;
        writeln!(writer, "Please commit these!")?;
        Ok(())
    }
}

impl TableDisplay for VerificationReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Verified {}", scope_label(&self.scope))?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Certificate Authority")?;
        writeln!(writer, "  Subject:        {}", self.ca_subject)?;
        writeln!(writer, "  Expires:        {}", date(self.ca_not_after))?;
        writeln!(writer)?;
        writeln!(writer, "Leaf")?;
        writeln!(writer, "  Subject:        {}", self.leaf_subject)?;
        if let Some(serial) = self.leaf_serial {
            writeln!(writer, "  Serial:         {serial}")?;
        }
        writeln!(writer, "  Expires:        {}", date(self.leaf_not_after))?;
        writeln!(writer, "  Days left:      {}", self.leaf_days_remaining)?;
        if !self.leaf_san.is_empty() {
            writeln!(writer, "  SAN:            {}", self.leaf_san.join(", "))?;
        }
        Ok(())
    }
}

impl TableDisplay for ProfileSet {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        write_profile(writer, "CA Profile", &self.ca)?;
        writeln!(writer)?;
        write_profile(writer, "Leaf Profile", &self.leaf)
    }
}

fn write_profile<W: Write>(
    writer: &mut W,
    title: &str,
    profile: &CertificateProfile,
) -> Result<(), CliError> {
    writeln!(writer, "{title} ({})", profile.name())?;
    writeln!(writer, "══════════════════════════════════")?;
    writeln!(writer, "Subject:          {}", profile.subject())?;
    writeln!(writer, "Key:              {}", profile.key_algorithm())?;
    writeln!(writer, "Validity:         {} days", profile.validity_days())?;
    writeln!(writer, "CA:               {}", profile.is_ca())?;
    writeln!(
        writer,
        "Key usage:        {}",
        join(profile.key_usages().iter().map(|u| key_usage_name(*u)))
    )?;
    if !profile.extended_key_usages().is_empty() {
        writeln!(
            writer,
            "Extended usage:   {}",
            join(profile.extended_key_usages().iter().map(ToString::to_string))
        )?;
    }
    if !profile.subject_alt_names().is_empty() {
        writeln!(writer, "SAN")?;
        for san in profile.subject_alt_names() {
            writeln!(writer, "  {san}")?;
        }
    }
    Ok(())
}

fn scope_label(scope: &Scope) -> String {
    format!("{}-{}", scope.az(), scope.cluster())
}

fn date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn join<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

const fn key_usage_name(usage: KeyUsage) -> &'static str {
    match usage {
        KeyUsage::DigitalSignature => "digitalSignature",
        KeyUsage::NonRepudiation => "nonRepudiation",
        KeyUsage::KeyEncipherment => "keyEncipherment",
        KeyUsage::DataEncipherment => "dataEncipherment",
        KeyUsage::KeyAgreement => "keyAgreement",
        KeyUsage::KeyCertSign => "keyCertSign",
        KeyUsage::CrlSign => "cRLSign",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chrono::TimeZone;
    use sidecar_pki::CaOutcome;

    use crate::config::ProfileConfig;

    fn scope() -> Scope {
        Scope::new("us-east-1", "production").unwrap()
    }

    fn issuance_report() -> IssuanceReport {
        IssuanceReport {
            scope: scope(),
            path: PathBuf::from("us-east-1/PRODUCTION"),
            ca_outcome: CaOutcome::Bootstrapped,
            ca_subject: "CN=us-east-1-PRODUCTION sidecar injector CA".into(),
            artifacts: vec![
                PathBuf::from("us-east-1/PRODUCTION/ca.key"),
                PathBuf::from("us-east-1/PRODUCTION/sidecar-injector.crt"),
            ],
            leaf_subject: "CN=k8s-sidecar-injector.kube-system.svc".into(),
            leaf_serial: 2,
            leaf_not_after: Utc.with_ymd_and_hms(4764, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn output_format_default_is_table() {
        let fmt = OutputFormat::default();
        assert_eq!(fmt.format(), Format::Table);
        assert!(!fmt.is_json());
    }

    #[test]
    fn output_format_json() {
        let fmt = OutputFormat::new(Format::Json);
        assert_eq!(fmt.format(), Format::Json);
        assert!(fmt.is_json());
    }

    #[test]
    fn issuance_report_table_output() {
        let fmt = OutputFormat::new(Format::Table);
        let output = fmt.to_string(&issuance_report()).expect("should format");

        assert!(output.contains("Issued certificates for us-east-1-PRODUCTION"));
        assert!(output.contains("Status:         bootstrapped"));
        assert!(output.contains("Serial:         2"));
        assert!(output.contains("Expires:        4764-01-01 00:00:00 UTC"));
        assert!(output.contains("us-east-1/PRODUCTION/ca.key"));
        assert!(output.ends_with("Please commit these!\n"));
    }

    #[test]
    fn issuance_report_json_output() {
        let fmt = OutputFormat::new(Format::Json);
        let output = fmt.to_string(&issuance_report()).expect("should format");

        assert!(output.contains("\"ca_outcome\": \"bootstrapped\""));
        assert!(output.contains("\"leaf_serial\": 2"));
        assert!(output.contains("\"cluster\": \"PRODUCTION\""));
    }

    #[test]
    fn verification_report_table_output() {
        let report = VerificationReport {
            scope: scope(),
            ca_subject: "CN=CA".into(),
            ca_not_after: Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap(),
            leaf_subject: "CN=leaf".into(),
            leaf_serial: None,
            leaf_san: vec!["DNS:a".into(), "IP:127.0.0.1".into()],
            leaf_not_after: Utc.with_ymd_and_hms(2029, 6, 1, 0, 0, 0).unwrap(),
            leaf_days_remaining: 42,
        };

        let output = OutputFormat::default().to_string(&report).expect("should format");
        assert!(output.contains("Verified us-east-1-PRODUCTION"));
        assert!(output.contains("Days left:      42"));
        assert!(output.contains("SAN:            DNS:a, IP:127.0.0.1"));
        assert!(!output.contains("Serial:"));
    }

    #[test]
    fn profile_set_table_output() {
        let set = ProfileConfig::default().profiles(&scope()).unwrap();
        let output = OutputFormat::default().to_string(&set).expect("should format");

        assert!(output.contains("CA Profile (ca)"));
        assert!(output.contains("Key:              rsa-4096"));
        assert!(output.contains("Leaf Profile (k8s-sidecar-injector)"));
        assert!(output.contains("Extended usage:   serverAuth"));
        assert!(output.contains("  DNS:k8s-sidecar-injector.kube-system.svc"));
        assert!(output.contains("keyCertSign"));
    }

    #[test]
    fn join_formats_list() {
        assert_eq!(join(["a", "b"]), "a, b");
        assert_eq!(join(Vec::<String>::new()), "");
    }
}
