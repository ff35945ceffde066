use std::io::Cursor;

use async_trait::async_trait;
use dicom::core::value::PrimitiveValue;
use dicom::core::{DataElement, Tag};
use dicom::object::{from_reader, DefaultDicomObject};
use tracing::debug;

use crate::codec::{decode_payload, CodecAction, CodecEngine, CodecError, OperationType, TagValue};
use crate::dicom_access::ElementAccess;
use crate::dictionary::{dictionary, TagKey};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// Codec engine backed by the dicom-rs object model.
#[derive(Debug, Default, Clone)]
pub struct DicomCodec;

impl DicomCodec {
    pub fn new() -> Self {
        Self
    }

    fn parse(bytes: &[u8]) -> Result<DefaultDicomObject, CodecError> {
        // Accept files with or without the 128-byte preamble.
        let body = if bytes.len() >= PREAMBLE_LEN + MAGIC.len()
            && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC
        {
            &bytes[PREAMBLE_LEN..]
        } else {
            bytes
        };
        from_reader(Cursor::new(body)).map_err(|e| CodecError::Decode(e.to_string()))
    }

    /// Synchronous core of `apply_actions`.
    pub fn rewrite(bytes: &[u8], actions: &[CodecAction]) -> Result<Vec<u8>, CodecError> {
        let mut obj = Self::parse(bytes)?;

        for action in actions {
            let tag = Tag(action.group, action.element);
            match action.operationtype {
                OperationType::Delete => {
                    obj.remove_element(tag);
                }
                OperationType::Update => {
                    // Only rewrite what the file carries; absent fields stay absent.
                    let Some(vr) = obj.element_vr(tag) else {
                        debug!(tag = %tag, "update skipped, element absent");
                        continue;
                    };
                    obj.put(DataElement::new(
                        tag,
                        vr,
                        PrimitiveValue::from(action.value.as_str()),
                    ));
                }
            }
        }

        let mut out = Vec::with_capacity(bytes.len());
        obj.write_all(&mut out)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        debug!(actions = actions.len(), size = out.len(), "rewrote DICOM object");
        Ok(out)
    }

    /// Applies a modification list given in its flat JSON form.
    pub fn apply_payload(bytes: &[u8], modifications: &str) -> Result<Vec<u8>, CodecError> {
        let actions = decode_payload(modifications)?;
        Self::rewrite(bytes, &actions)
    }

    pub fn values(bytes: &[u8], keys: &[TagKey]) -> Result<Vec<TagValue>, CodecError> {
        let obj = Self::parse(bytes)?;
        Ok(keys
            .iter()
            .map(|key| {
                let descriptor = key.descriptor();
                TagValue {
                    key: *key,
                    value: obj.element_str(Tag(descriptor.group, descriptor.element)),
                }
            })
            .collect())
    }
}

#[async_trait]
impl CodecEngine for DicomCodec {
    async fn initialize(&self) -> Result<(), CodecError> {
        // Forces the tag catalog to load before the first rewrite.
        if dictionary(None).is_empty() {
            return Err(CodecError::Init("empty tag catalog".into()));
        }
        Ok(())
    }

    async fn apply_actions(
        &self,
        bytes: &[u8],
        actions: &[CodecAction],
    ) -> Result<Vec<u8>, CodecError> {
        Self::rewrite(bytes, actions)
    }

    async fn query_values(
        &self,
        bytes: &[u8],
        keys: &[TagKey],
    ) -> Result<Vec<TagValue>, CodecError> {
        Self::values(bytes, keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = DicomCodec::rewrite(b"definitely not dicom", &[]).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn malformed_payload_is_reported() {
        let err = DicomCodec::apply_payload(b"", "{not json").unwrap_err();
        assert!(matches!(err, CodecError::Payload(_)));
    }
}
