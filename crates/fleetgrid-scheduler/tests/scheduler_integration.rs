//! Scheduler end to end over an in-memory fleet.

use std::sync::Arc;

use fleetgrid_placement::{CapabilityMode, FailureKind, PlacementConfig};
use fleetgrid_scheduler::{PlacementRequest, PlacementResponse, Scheduler, SchedulerError};
use fleetgrid_state::{
    CapabilityPublisher, CapabilityReport, CatalogStore, MemoryDirectory, RequestContext,
    ResourceProfile, ServiceRecord, COMPUTE_TOPIC, VOLUME_TOPIC,
};
use serde_json::json;

fn report(arch: &str, vcpus: i64) -> CapabilityReport {
    let mut report = CapabilityReport::new();
    report.insert("cpu_arch".into(), json!(arch));
    report.insert("vcpus".into(), json!(vcpus));
    report.insert("vcpus_used".into(), json!(0));
    report.insert("host_memory_free".into(), json!(32768));
    report.insert("disk_total".into(), json!(1000));
    report.insert("disk_used".into(), json!(0));
    report
}

async fn fleet() -> MemoryDirectory {
    let dir = MemoryDirectory::with_default_profiles();
    for (host, arch) in [("x86-1", "x86_64"), ("x86-2", "x86_64"), ("tile-1", "tilepro64")] {
        dir.register_service(ServiceRecord::new(host, COMPUTE_TOPIC)).await;
        let mut caps = report(arch, 16);
        if arch == "tilepro64" {
            caps.insert("vcores".into(), json!(64));
            caps.insert("hypervisor_type".into(), json!("tilera_hv"));
            caps.insert("baremetal_driver".into(), json!("tilera"));
        }
        dir.update_capabilities(COMPUTE_TOPIC, host, caps).await.unwrap();
    }
    let volumes = [("vol-a", "east", 40), ("vol-b", "east", 10), ("vol-c", "west", 0)];
    for (host, zone, committed) in volumes {
        dir.register_service(ServiceRecord::new(host, VOLUME_TOPIC).in_zone(zone))
            .await;
        dir.set_committed_gigabytes(host, committed).await;
    }
    dir
}

fn scheduler(dir: &MemoryDirectory, config: PlacementConfig) -> Scheduler {
    Scheduler::new(Arc::new(dir.clone()), Arc::new(dir.clone()), config).unwrap()
}

#[tokio::test]
async fn places_every_requested_instance() {
    let dir = fleet().await;
    let profiles = dir.list_resource_profiles().await.unwrap();
    let tilera = profiles.iter().find(|p| p.name == "tp64.8x8").unwrap();
    let sched = scheduler(&dir, PlacementConfig::default());

    let req = PlacementRequest::compute(tilera.id).with_instances(3);
    let placements = sched
        .schedule_run_instance(&RequestContext::new("alice", "proj"), &req)
        .await
        .unwrap();

    assert_eq!(placements.len(), 3);
    for placement in &placements {
        assert_eq!(placement.host, "tile-1");
        assert_eq!(placement.profile_id, Some(tilera.id));
        assert!(placement.decided_at > 0);
    }
}

#[tokio::test]
async fn general_profile_lands_on_any_live_host() {
    let dir = fleet().await;
    let sched = scheduler(&dir, PlacementConfig::default());

    let resp = sched
        .place(&RequestContext::default(), &PlacementRequest::compute(1).with_instances(2))
        .await;
    match resp {
        PlacementResponse::Placed {
            selected_host,
            selected_hosts,
        } => {
            assert_eq!(selected_hosts.len(), 2);
            assert_eq!(selected_host, selected_hosts[0]);
            for host in &selected_hosts {
                assert!(["x86-1", "x86-2", "tile-1"].contains(&host.as_str()));
            }
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn unsatisfiable_profile_fails_with_no_valid_host() {
    let dir = fleet().await;
    dir.put_profile(
        ResourceProfile::new(500, 500, "huge", 64, 1024, 10).with_extra_spec("cpu_arch", "x86_64"),
    )
    .await
    .unwrap();
    let sched = scheduler(&dir, PlacementConfig::default());

    let resp = sched
        .place(&RequestContext::default(), &PlacementRequest::compute(500))
        .await;
    assert!(matches!(
        resp,
        PlacementResponse::Failed {
            kind: FailureKind::NoValidHost,
            ..
        }
    ));
}

#[tokio::test]
async fn host_going_down_is_excluded() {
    let dir = fleet().await;
    let mut stale = ServiceRecord::new("x86-2", COMPUTE_TOPIC);
    stale.last_heartbeat = 0;
    dir.register_service(stale).await;
    dir.set_disabled("tile-1", COMPUTE_TOPIC, true).await;
    let sched = scheduler(&dir, PlacementConfig::default());

    let req = PlacementRequest::compute(1).with_instances(4);
    let placements = sched
        .schedule_run_instance(&RequestContext::default(), &req)
        .await
        .unwrap();
    assert!(placements.iter().all(|p| p.host == "x86-1"));
}

#[tokio::test]
async fn volume_requests_respect_zone_and_load() {
    let dir = fleet().await;
    let sched = scheduler(&dir, PlacementConfig::default());
    let ctx = RequestContext::default();

    let any = sched.place(&ctx, &PlacementRequest::volume(10)).await;
    assert!(matches!(
        any,
        PlacementResponse::Placed { ref selected_host, .. } if selected_host == "vol-c"
    ));

    let east = sched
        .place(&ctx, &PlacementRequest::volume(10).in_zone("east"))
        .await;
    assert!(matches!(
        east,
        PlacementResponse::Placed { ref selected_host, .. } if selected_host == "vol-b"
    ));
}

#[tokio::test]
async fn volume_quota_is_reported_with_reason() {
    let dir = fleet().await;
    let sched = scheduler(
        &dir,
        PlacementConfig {
            max_gigabytes: 50,
            ..PlacementConfig::default()
        },
    );

    let resp = sched
        .place(&RequestContext::default(), &PlacementRequest::volume(45).in_zone("east"))
        .await;
    assert_eq!(
        resp,
        PlacementResponse::Failed {
            kind: FailureKind::NoValidHost,
            reason: "All hosts have too many gigabytes".into(),
        }
    );
}

#[tokio::test]
async fn admin_pin_to_dead_volume_host_will_not_schedule() {
    let dir = fleet().await;
    let mut dead = ServiceRecord::new("vol-a", VOLUME_TOPIC).in_zone("east");
    dead.last_heartbeat = 0;
    dir.register_service(dead).await;
    let sched = scheduler(&dir, PlacementConfig::default());

    let req = PlacementRequest::volume(1).in_zone("east:vol-a");
    let err = sched
        .schedule_create_volume(&RequestContext::admin(), &req)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::WillNotSchedule);

    // The same pin from a regular user is ignored and the zone still applies.
    let placement = sched
        .schedule_create_volume(&RequestContext::new("bob", "proj"), &req)
        .await
        .unwrap();
    assert_eq!(placement.host, "vol-b");
    assert_eq!(placement.profile_id, None);
}

#[tokio::test]
async fn nested_mode_from_toml_config() {
    let dir = fleet().await;
    let mut detailed = report("x86_64", 16);
    detailed.insert(
        "cpu_info".into(),
        json!(r#"{"vendor":"amd","topology":{"sockets":2,"cores":8}}"#),
    );
    dir.update_capabilities(COMPUTE_TOPIC, "x86-1", detailed).await.unwrap();
    dir.put_profile(
        ResourceProfile::new(600, 600, "dual-socket", 2, 1024, 10)
            .with_extra_spec("cpu_info.topology.sockets", ">= 2"),
    )
    .await
    .unwrap();

    let config = PlacementConfig::from_toml_str("capability_mode = \"nested\"\n").unwrap();
    assert_eq!(config.capability_mode, CapabilityMode::Nested);
    let sched = scheduler(&dir, config);

    let placements = sched
        .schedule_run_instance(&RequestContext::default(), &PlacementRequest::compute(600))
        .await
        .unwrap();
    assert_eq!(placements[0].host, "x86-1");
}

#[tokio::test]
async fn unknown_profile_maps_to_invalid_request() {
    let dir = fleet().await;
    let sched = scheduler(&dir, PlacementConfig::default());

    let err = sched
        .schedule_run_instance(&RequestContext::default(), &PlacementRequest::compute(4242))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ProfileNotFound(4242)));

    let resp = sched
        .place(&RequestContext::default(), &PlacementRequest::compute(4242))
        .await;
    assert!(matches!(
        resp,
        PlacementResponse::Failed {
            kind: FailureKind::InvalidRequest,
            ..
        }
    ));
}
