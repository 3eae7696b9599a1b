//! Descriptor build protocol (spec §4.D): cache read → device description
//! fetch → per-service SCPD fetch → optional cache write.

use crate::descriptor::cache_xml::{parse_cache, serialize_cache};
use crate::descriptor::live_xml::parse_device_description;
use crate::descriptor::model::{Device, Object};
use crate::descriptor::scpd_xml::{parse_scpd, resolve_argument_types};
use crate::error::{CacheWarning, DescriptorError};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

/// Performs the HTTP GETs the builder needs, one path at a time. Implemented
/// by [`crate::transport::RequestContext`] in the running binary; a plain
/// closure/mock suffices in tests.
pub trait DescriptionFetcher {
    fn get(&mut self, path: &str) -> Result<Vec<u8>, DescriptorError>;
}

pub struct BuildReport {
    pub object: Object,
    pub device_description_duration: Duration,
    pub scpd_durations: Vec<(String, Duration)>,
    pub cache_warning: Option<CacheWarning>,
}

/// Run the full four-step build protocol against `requested_url` (whose
/// path component `fetcher` already knows how to GET).
pub fn build(
    cache_path: Option<&Path>,
    requested_url: &str,
    device_path: &str,
    fetcher: &mut dyn DescriptionFetcher,
) -> Result<BuildReport, DescriptorError> {
    if let Some(path) = cache_path {
        match try_read_cache(path, requested_url) {
            Ok(Some(object)) => {
                return Ok(BuildReport {
                    object,
                    device_description_duration: Duration::ZERO,
                    scpd_durations: Vec::new(),
                    cache_warning: None,
                });
            }
            Ok(None) => {}
            Err(_warning) => {}
        }
    }

    let t0 = Instant::now();
    let description_bytes = fetcher.get(device_path)?;
    let device_description_duration = t0.elapsed();

    let live = parse_device_description(&description_bytes).map_err(DescriptorError::DescriptorFormat)?;
    let object_name = live.object_name.ok_or(DescriptorError::MissingDevice)?;
    if live.devices.is_empty() {
        return Err(DescriptorError::MissingDevice);
    }

    let mut devices = Vec::with_capacity(live.devices.len());
    let mut scpd_durations = Vec::new();
    for device in live.devices {
        let mut resolved_services = Vec::with_capacity(device.services.len());
        for service in device.services {
            let scpd_request_path = service.scpd_path.trim_start_matches('/');
            let t1 = Instant::now();
            let scpd_bytes = fetcher.get(scpd_request_path)?;
            let elapsed = t1.elapsed();
            scpd_durations.push((service.name.clone(), elapsed));

            let scpd = parse_scpd(&scpd_bytes).map_err(DescriptorError::DescriptorFormat)?;
            let actions = resolve_argument_types(scpd.actions, &scpd.state_variables)?;
            resolved_services.push(crate::descriptor::model::Service { actions, ..service });
        }
        devices.push(Device {
            name: device.name,
            services: resolved_services,
        });
    }

    let object = Object {
        name: object_name,
        url: requested_url.to_string(),
        devices,
    };

    let cache_warning = cache_path.and_then(|path| write_cache(path, &object).err());

    Ok(BuildReport {
        object,
        device_description_duration,
        scpd_durations,
        cache_warning,
    })
}

fn try_read_cache(path: &Path, requested_url: &str) -> Result<Option<Object>, CacheWarning> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(_) => return Ok(None),
    };
    parse_cache(&bytes, requested_url).map_err(|e| CacheWarning::Format {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Atomic cache write: write to a sibling temp file, then rename into place
/// (grounded on the teacher's `read_cache.rs` pattern). Write failure is a
/// warning, never a build failure.
fn write_cache(path: &Path, object: &Object) -> Result<(), CacheWarning> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    if let Err(e) = fs::create_dir_all(dir) {
        return Err(CacheWarning::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        });
    }
    let tmp_name = format!(".tmp-{}-{}", std::process::id(), tmp_suffix());
    let tmp_path = dir.join(tmp_name);
    let serialized = serialize_cache(object);
    fs::write(&tmp_path, serialized).map_err(|e| CacheWarning::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    fs::rename(&tmp_path, path).map_err(|e| CacheWarning::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn tmp_suffix() -> u128 {
    use std::time::UNIX_EPOCH;
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockFetcher {
        responses: HashMap<String, Vec<u8>>,
    }

    impl DescriptionFetcher for MockFetcher {
        fn get(&mut self, path: &str) -> Result<Vec<u8>, DescriptorError> {
            self.responses
                .get(path)
                .cloned()
                .ok_or_else(|| DescriptorError::MissingDevice)
        }
    }

    const DESCRIPTION: &str = r#"<root>
  <device>
    <deviceType>urn:dslforum-org:device:InternetGatewayDevice:1</deviceType>
    <friendlyName>Gateway</friendlyName>
    <serviceList>
      <service>
        <serviceType>urn:dslforum-org:service:WANIPConnection:1</serviceType>
        <controlURL>/control</controlURL>
        <SCPDURL>/wanip.xml</SCPDURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    const SCPD: &str = r#"<scpd>
  <actionList>
    <action>
      <name>GetExternalIPAddress</name>
      <argumentList>
        <argument>
          <name>NewExternalIPAddress</name>
          <direction>out</direction>
          <relatedStateVariable>ExternalIPAddress</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable>
      <name>ExternalIPAddress</name>
      <dataType>string</dataType>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

    #[test]
    fn builds_tree_from_mocked_fetches() {
        let mut responses = HashMap::new();
        responses.insert("desc.xml".to_string(), DESCRIPTION.as_bytes().to_vec());
        responses.insert("wanip.xml".to_string(), SCPD.as_bytes().to_vec());
        let mut fetcher = MockFetcher { responses };

        let report = build(None, "http://host/desc.xml", "desc.xml", &mut fetcher).unwrap();
        assert_eq!(report.object.name, "Gateway");
        assert_eq!(report.object.devices[0].services[0].actions[0].name, "GetExternalIPAddress");
        assert_eq!(
            report.object.devices[0].services[0].actions[0].arguments[0].data_type,
            "string"
        );
    }
}
