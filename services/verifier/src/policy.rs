//! Firewall policy candidate rendering.
//!
//! Produces the Junos XML fragment that declares one application object and
//! one untrust-to-trust permit policy per exposed service, named with the
//! same canonical identifiers the config checks look for.

use std::fmt::Write;

use netverify_assertions::naming;
use netverify_inventory::ServiceEndpoint;

/// Zone traffic arrives from.
pub const FROM_ZONE: &str = "untrust";

/// Zone the services live in.
pub const TO_ZONE: &str = "trust";

/// Render the merge candidate for `endpoints`.
pub fn render_policies(endpoints: &[ServiceEndpoint]) -> String {
    let mut sorted: Vec<&ServiceEndpoint> = endpoints.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::from("<configuration>\n  <applications>\n");
    for endpoint in &sorted {
        let _ = write!(
            out,
            "    <application>\n      <name>{}</name>\n      <protocol>tcp</protocol>\n      <destination-port>{}</destination-port>\n    </application>\n",
            escape(&naming::application_name(&endpoint.name)),
            endpoint.port
        );
    }
    out.push_str("  </applications>\n  <security>\n    <policies>\n      <policy>\n");
    let _ = write!(
        out,
        "        <from-zone-name>{FROM_ZONE}</from-zone-name>\n        <to-zone-name>{TO_ZONE}</to-zone-name>\n"
    );
    for endpoint in &sorted {
        let _ = write!(
            out,
            "        <policy>\n          <name>{}</name>\n          <match>\n            <source-address>any</source-address>\n            <destination-address>any</destination-address>\n            <application>{}</application>\n          </match>\n          <then>\n            <permit/>\n          </then>\n        </policy>\n",
            escape(&naming::policy_name(&endpoint.name)),
            escape(&naming::application_name(&endpoint.name)),
        );
    }
    out.push_str("      </policy>\n    </policies>\n  </security>\n</configuration>\n");
    out
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_uses_canonical_names() {
        let xml = render_policies(&[
            ServiceEndpoint::new("web", 30080),
            ServiceEndpoint::new("api", 30443),
        ]);

        assert!(xml.contains("<name>k8sweb</name>"));
        assert!(xml.contains("<destination-port>30080</destination-port>"));
        assert!(xml.contains("<name>K8SPOLICY_ALLOW_WEB</name>"));
        assert!(xml.contains("<application>k8sapi</application>"));
        assert!(xml.find("k8sapi").unwrap() < xml.find("k8sweb").unwrap());
    }

    #[test]
    fn test_render_empty_inventory() {
        let xml = render_policies(&[]);
        assert!(xml.starts_with("<configuration>"));
        assert!(!xml.contains("<application>"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
