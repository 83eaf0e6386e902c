//! Device creation ladder and capability fix-ups.

use tracing::{debug, warn};

use crate::device::{DeviceCaps, DeviceFactory, LineCaps, PresentParams, VertexProcessing};
use crate::error::{CreationAttempt, InitError};

pub const VENDOR_NVIDIA: u32 = 0x10de;
pub const VENDOR_ATI: u32 = 0x1002;

/// Configurations to try, most capable first. Retrying at the driver's default refresh rate
/// only makes sense when a specific rate was requested.
pub fn creation_ladder(refresh_rate: u32) -> Vec<(VertexProcessing, u32)> {
    let mut ladder = vec![
        (VertexProcessing::Hardware, refresh_rate),
        (VertexProcessing::Software, refresh_rate),
    ];
    if refresh_rate != 0 {
        ladder.push((VertexProcessing::Hardware, 0));
        ladder.push((VertexProcessing::Software, 0));
    }
    ladder
}

/// Walks [`creation_ladder`] and returns the first device the factory produces.
pub fn create_device<F: DeviceFactory>(
    factory: &mut F,
    adapter: u32,
    params: &PresentParams,
) -> Result<F::Device, InitError> {
    let mut attempts = Vec::new();
    for (vertex_processing, refresh_rate) in creation_ladder(params.refresh_rate) {
        let params = PresentParams {
            refresh_rate,
            ..*params
        };
        match factory.create_device(adapter, vertex_processing, &params) {
            Ok(device) => {
                debug!(
                    adapter,
                    ?vertex_processing,
                    refresh_rate,
                    failed_attempts = attempts.len(),
                    "created device"
                );
                return Ok(device);
            }
            Err(error) => {
                debug!(adapter, ?vertex_processing, refresh_rate, %error, "device creation failed");
                attempts.push(CreationAttempt {
                    vertex_processing,
                    refresh_rate,
                    error,
                });
            }
        }
    }
    warn!(adapter, attempts = attempts.len(), "no device configuration succeeded");
    Err(InitError::NoDevice { attempts })
}

/// Corrects capability bits some drivers misreport.
///
/// NVIDIA drivers support antialiased lines while claiming they don't. ATI drivers report
/// the bit unreliably in both directions, so it is never trusted there.
pub fn apply_vendor_caps(mut caps: DeviceCaps, vendor_id: Option<u32>) -> DeviceCaps {
    match vendor_id {
        Some(VENDOR_NVIDIA) => {
            debug!("forcing antialiased line support for NVIDIA adapter");
            caps.line_caps |= LineCaps::ANTIALIAS;
        }
        Some(VENDOR_ATI) => {
            debug!("ignoring antialiased line capability for ATI adapter");
            caps.line_caps.remove(LineCaps::ANTIALIAS);
        }
        _ => {}
    }
    caps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessFactory;
    use pretty_assertions::assert_eq;

    fn params(refresh_rate: u32) -> PresentParams {
        PresentParams {
            windowed: false,
            back_buffer_width: 320,
            back_buffer_height: 200,
            back_buffer_format: None,
            back_buffer_count: 1,
            vsync: false,
            refresh_rate,
        }
    }

    #[test]
    fn ladder_only_drops_refresh_rate_when_one_was_forced() {
        assert_eq!(creation_ladder(0).len(), 2);
        assert_eq!(
            creation_ladder(70),
            vec![
                (VertexProcessing::Hardware, 70),
                (VertexProcessing::Software, 70),
                (VertexProcessing::Hardware, 0),
                (VertexProcessing::Software, 0),
            ]
        );
    }

    #[test]
    fn falls_back_to_default_refresh_rate() {
        let mut factory = HeadlessFactory {
            reject_nonzero_refresh: true,
            reject_hardware_vp: true,
            ..Default::default()
        };
        let device = create_device(&mut factory, 0, &params(85)).unwrap();
        assert_eq!(device.present_params().refresh_rate, 0);
        assert_eq!(
            factory.attempts(),
            &[
                (VertexProcessing::Hardware, 85),
                (VertexProcessing::Software, 85),
                (VertexProcessing::Hardware, 0),
                (VertexProcessing::Software, 0),
            ]
        );
    }

    #[test]
    fn aggregates_every_failed_attempt() {
        let mut factory = HeadlessFactory {
            reject_hardware_vp: true,
            reject_software_vp: true,
            ..Default::default()
        };
        match create_device(&mut factory, 0, &params(60)) {
            Err(InitError::NoDevice { attempts }) => {
                assert_eq!(attempts.len(), 4);
                assert_eq!(attempts[3].vertex_processing, VertexProcessing::Software);
                assert_eq!(attempts[3].refresh_rate, 0);
            }
            other => panic!("expected NoDevice, got {other:?}"),
        }
    }

    #[test]
    fn vendor_corrections() {
        let caps = DeviceCaps::default();
        assert!(apply_vendor_caps(caps, Some(VENDOR_NVIDIA))
            .line_caps
            .contains(LineCaps::ANTIALIAS));

        let ati = DeviceCaps {
            line_caps: LineCaps::ANTIALIAS | LineCaps::BLEND,
            ..caps
        };
        assert_eq!(
            apply_vendor_caps(ati, Some(VENDOR_ATI)).line_caps,
            LineCaps::BLEND
        );
        assert_eq!(apply_vendor_caps(ati, None), ati);
    }
}
