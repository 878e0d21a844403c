//! Event-driven parsing of the device-definition XML format.
//!
//! The format is a single `<device_repository>` element wrapping a
//! `<devices>` list. Each `<device>` carries `id`, `user_agent`, `parent`
//! and `actual_device_root` attributes and nests its capability overrides
//! in `<group>` elements:
//!
//! ```text
//! <device_repository version="2024-06">
//!   <devices>
//!     <device id="generic" user_agent="">
//!       <group id="product_info">
//!         <capability name="brand_name" value=""/>
//!       </group>
//!     </device>
//!   </devices>
//! </device_repository>
//! ```

use devc_common::{DetectError, DetectResult, DeviceRecord};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One parsed document: devices in definition order plus metadata.
#[derive(Debug, Default)]
pub(crate) struct Document {
    pub version: Option<String>,
    pub devices: Vec<DeviceRecord>,
    /// `(capability name, group id)` pairs in definition order
    pub groups: Vec<(String, String)>,
}

/// Fetch a named attribute, unescaped.
fn attr(e: &BytesStart<'_>, name: &str) -> DetectResult<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|err| DetectError::UnexpectedEndOfFile(err.to_string()))?;
        if a.key.as_ref() == name.as_bytes() {
            let value = a
                .unescape_value()
                .map_err(|err| DetectError::UnexpectedEndOfFile(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn open_device(e: &BytesStart<'_>) -> DetectResult<DeviceRecord> {
    let id = attr(e, "id")?
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DetectError::XmlConsistency("device element without id".into()))?;

    let mut rec = DeviceRecord::new(id);
    rec.user_agent = attr(e, "user_agent")?.unwrap_or_default();
    // `parent="root"` is the historical spelling for "no parent".
    rec.parent = attr(e, "parent")?.filter(|p| !p.is_empty() && p != "root");
    rec.actual_device_root = attr(e, "actual_device_root")?.as_deref() == Some("true");
    Ok(rec)
}

pub(crate) fn parse(text: &str) -> DetectResult<Document> {
    let mut reader = Reader::from_str(text);

    let mut doc = Document::default();
    let mut saw_root = false;
    let mut device: Option<DeviceRecord> = None;
    let mut group: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| DetectError::UnexpectedEndOfFile(err.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"device_repository" => {
                        saw_root = true;
                        doc.version = attr(e, "version")?;
                    }
                    b"device" => {
                        if device.is_some() {
                            return Err(DetectError::XmlConsistency(
                                "nested device element".into(),
                            ));
                        }
                        let rec = open_device(e)?;
                        if is_empty {
                            doc.devices.push(rec);
                        } else {
                            device = Some(rec);
                        }
                    }
                    b"group" => {
                        if !is_empty {
                            group = attr(e, "id")?;
                        }
                    }
                    b"capability" => {
                        let name = attr(e, "name")?.filter(|n| !n.is_empty()).ok_or_else(
                            || DetectError::XmlConsistency("capability without name".into()),
                        )?;
                        let value = attr(e, "value")?.unwrap_or_default();
                        if let Some(g) = &group {
                            doc.groups.push((name.clone(), g.clone()));
                        }
                        match device.as_mut() {
                            Some(rec) => {
                                rec.capabilities.insert(name, value);
                            }
                            None => {
                                return Err(DetectError::XmlConsistency(
                                    "capability outside device element".into(),
                                ))
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"device" => {
                    if let Some(rec) = device.take() {
                        doc.devices.push(rec);
                    }
                }
                b"group" => group = None,
                _ => {}
            },
            _ => {}
        }
    }

    if device.is_some() {
        return Err(DetectError::UnexpectedEndOfFile(
            "input ended inside a device element".into(),
        ));
    }
    if !saw_root {
        return Err(DetectError::UnexpectedEndOfFile(
            "missing device_repository root element".into(),
        ));
    }

    Ok(doc)
}
