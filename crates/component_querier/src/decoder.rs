//! Multi-record scan over a response datagram.

use crate::{
    component::ComponentId,
    error::QuerierResult,
    wire::{RecordStream, ResponseRecord},
};
use log::{debug, trace};

/// Resolves a component id from the records of one datagram.
///
/// `first` is the record already decoded from the front of the datagram and
/// `stream` holds the bytes after it. Unknown-type and zero-id records are
/// scanned past, a later answer overwrites an earlier one, and a malformed
/// record ends the scan with whatever was resolved so far.
pub fn scan_records(first: ResponseRecord, stream: &mut RecordStream) -> ComponentId {
    let mut resolved = ComponentId::UNSET;
    let mut record = first;

    loop {
        if record.component_type.is_unknown() {
            trace!("skipping placeholder record id={}", record.component_id);
        } else if !record.component_id.is_set() {
            trace!("skipping unset id for {}", record.component_type);
        } else {
            resolved = record.component_id;
        }

        if stream.remaining() == 0 {
            break;
        }

        match stream.decode_record() {
            Ok((next, _)) => record = next,
            Err(err) => {
                debug!(
                    "stopped scanning at byte {} with {} left: {}",
                    stream.position(),
                    stream.remaining(),
                    err
                );
                break;
            }
        }
    }

    resolved
}

/// Decodes the leading record of `datagram` and scans the rest of it.
pub fn resolve_datagram(datagram: &[u8]) -> QuerierResult<ComponentId> {
    let mut stream = RecordStream::new(datagram);
    let (first, _) = stream.decode_record()?;
    Ok(scan_records(first, &mut stream))
}
