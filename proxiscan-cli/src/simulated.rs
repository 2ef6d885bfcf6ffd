//! A scripted camera walking up to the radio and away again, next to a
//! television that never matches.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use uuid::Uuid;

use proxiscan_discovery::RadioState;
use proxiscan_discovery::memory::{ConnectBehaviour, MemoryRadio, ReadBehaviour, SimulatedPeripheral};
use proxiscan_domain::advertisement::CandidateHandle;
use proxiscan_domain::config::DiscoveryConfig;

pub const CAMERA_IDENTITY: Uuid = Uuid::from_u128(0x9b1d_eb4d_3b7d_4bad_9bdd_2b0d_7b3d_cb6d);

const CAMERA_HANDLE: &str = "sim-camera";
const TV_HANDLE: &str = "sim-tv";
const RSSI_WALK: [i16; 10] = [-95, -85, -75, -65, -58, -52, -58, -65, -75, -85];

pub fn radio(config: &DiscoveryConfig) -> Arc<MemoryRadio> {
    let radio = MemoryRadio::new();
    radio.add_peripheral(
        CandidateHandle::new(CAMERA_HANDLE),
        SimulatedPeripheral::new(ConnectBehaviour::Delay(Duration::from_millis(300)))
            .with_characteristic(
                config.target_service,
                config.target_characteristic,
                ReadBehaviour::Value(CAMERA_IDENTITY.to_string().into_bytes()),
            ),
    );
    Arc::new(radio)
}

/// Advertises once a second, forever.
pub async fn play(radio: Arc<MemoryRadio>, target_name: String) {
    let camera = CandidateHandle::new(CAMERA_HANDLE);
    let tv = CandidateHandle::new(TV_HANDLE);
    radio.set_state(RadioState::PoweredOn);
    let mut tick = time::interval(Duration::from_secs(1));
    for rssi in RSSI_WALK.iter().cycle() {
        tick.tick().await;
        radio.advertise(&camera, &target_name, *rssi);
        radio.advertise(&tv, "living-room-tv", -48);
    }
}
