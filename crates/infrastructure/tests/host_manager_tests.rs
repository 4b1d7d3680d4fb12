use std::sync::Arc;
use std::thread;

use host_ledger_core::config::HostConfig;
use host_ledger_core::units::{GB, GB16, GB2, GB32, GB4, MB512};
use host_ledger_core::LedgerError;
use host_ledger_domain::{
    Allocation, HardwareReport, HardwareState, HostId, HostManager, LockState, ResourceRequest,
    Source, ThreadMode,
};
use host_ledger_infrastructure::{InMemoryAllocationDirectory, InMemoryHostRepository};

const TEST_HOST: &str = "beta";

fn build_report(name: &str) -> HardwareReport {
    HardwareReport {
        name: name.to_string(),
        boot_time: 1_192_369_572,
        total_memory: GB16 as i64,
        free_memory: (GB16 - GB) as i64,
        total_swap: GB2 as i64,
        free_swap: GB2 as i64,
        total_mcp: GB4 as i64,
        free_mcp: GB4 as i64,
        num_procs: 2,
        cores_per_proc: 400,
        load: 0,
        tags: vec!["linux".to_string(), "64bit".to_string()],
        ..HardwareReport::default()
    }
}

struct Fixture {
    manager: Arc<HostManager>,
    directory: Arc<InMemoryAllocationDirectory>,
}

fn fixture_with(config: HostConfig) -> Fixture {
    let repository = Arc::new(InMemoryHostRepository::new());
    let directory = Arc::new(InMemoryAllocationDirectory::new());
    let manager = Arc::new(HostManager::new(repository, directory.clone(), config));
    Fixture { manager, directory }
}

fn fixture() -> Fixture {
    fixture_with(HostConfig::default())
}

fn long_name_config() -> HostConfig {
    HostConfig {
        fqdn_domains: vec!["spimageworks.com".to_string()],
        use_long_names: true,
        ..HostConfig::default()
    }
}

#[test]
fn test_insert_host() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();

    assert_eq!(host.name, TEST_HOST);
    assert_eq!(host.resources.memory.idle(), GB16 - MB512);
    assert_eq!(host.resources.cores.idle(), 800);
    assert_eq!(host.hardware_state, HardwareState::Up);
    assert!(f.manager.host_exists(TEST_HOST).unwrap());
    assert_eq!(f.manager.get_host(host.id).unwrap(), host);
}

#[test]
fn test_insert_host_long_name() {
    let f = fixture_with(long_name_config());
    f.manager
        .create_or_update_host(&build_report("ice-ns1.yvr.spimageworks.com"))
        .unwrap();

    assert_eq!(f.manager.find_host("ice-ns1.yvr").unwrap().name, "ice-ns1.yvr");
    assert_eq!(
        f.manager
            .find_host("ice-ns1.yvr.spimageworks.com")
            .unwrap()
            .name,
        "ice-ns1.yvr"
    );
}

#[test]
fn test_insert_host_short_name() {
    let f = fixture();
    for (fqdn, short) in [
        ("compile21.spimageworks.com", "compile21"),
        ("hostname.fake.co.uk", "hostname"),
    ] {
        f.manager.create_or_update_host(&build_report(fqdn)).unwrap();
        assert_eq!(f.manager.find_host(short).unwrap().name, short);
        assert_eq!(f.manager.find_host(fqdn).unwrap().name, short);
    }
}

#[test]
fn test_insert_host_ip_addresses() {
    let f = fixture();
    for name in ["10.0.1.18", "::1", "ABCD:ABCD:ABCD:ABCD:ABCD:ABCD:ABCD:ABCD"] {
        let host = f.manager.create_or_update_host(&build_report(name)).unwrap();
        assert_eq!(host.name, name);
        assert_eq!(f.manager.find_host(name).unwrap().id, host.id);
    }
}

#[test]
fn test_insert_host_with_os_attribute() {
    let f = fixture();
    let mut report = build_report(TEST_HOST);
    report
        .attributes
        .insert("SP_OS".to_string(), "spinux1".to_string());
    let host = f.manager.create_or_update_host(&report).unwrap();
    assert_eq!(host.stats.os, "spinux1");

    f.manager.update_os(host.id, "centos7").unwrap();
    assert_eq!(f.manager.get_host(host.id).unwrap().stats.os, "centos7");
    assert!(f.manager.update_os(host.id, "  ").is_err());
}

#[test]
fn test_default_allocation_for_new_hosts() {
    let f = fixture();
    let id = f
        .directory
        .register(Allocation::new("spi.general").with_tag("general"))
        .unwrap();
    f.directory.set_default(Some(id)).unwrap();

    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    assert_eq!(host.allocation_id, Some(id));
    assert_eq!(host.tags.to_storage_string(), "general beta 64bit linux");
}

#[test]
fn test_second_report_updates_existing_host() {
    let f = fixture();
    let first = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    let second = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.resources, second.resources);
}

#[test]
fn test_rediscover_resources() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    assert_eq!(host.resources.cores.total(), 800);
    assert_eq!(host.resources.memory.total(), GB16);

    let mut bigger = build_report(TEST_HOST);
    bigger.cores_per_proc = 1200;
    bigger.total_memory = GB32 as i64;
    bigger.free_memory = GB32 as i64;
    let host = f.manager.create_or_update_host(&bigger).unwrap();

    assert_eq!(host.resources.cores.total(), 2400);
    assert_eq!(host.resources.cores.idle(), 2400);
    assert_eq!(host.resources.memory.total(), GB32);
    assert_eq!(host.resources.memory.idle(), GB32 - MB512);
}

#[test]
fn test_reserve_and_release() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();

    f.manager.reserve(host.id, 300, GB4).unwrap();
    let reserved = f.manager.get_host(host.id).unwrap();
    assert_eq!(reserved.resources.cores.idle(), 500);
    assert_eq!(reserved.resources.memory.idle(), GB16 - MB512 - GB4);

    let err = f.manager.reserve(host.id, 600, GB).unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(f.manager.get_host(host.id).unwrap().resources, reserved.resources);

    f.manager.release(host.id, 300, GB4).unwrap();
    let released = f.manager.get_host(host.id).unwrap();
    assert_eq!(released.resources.cores.idle(), 800);
    assert_eq!(released.resources.memory.idle(), GB16 - MB512);
}

#[test]
fn test_reserve_gpu_resources() {
    let f = fixture();
    let mut report = build_report(TEST_HOST);
    report.num_gpus = 2;
    report.total_gpu_memory = GB4 as i64;
    let host = f.manager.create_or_update_host(&report).unwrap();

    let request = ResourceRequest::new(100, GB).with_gpus(1, GB2);
    f.manager.reserve_resources(host.id, &request).unwrap();
    let host = f.manager.get_host(host.id).unwrap();
    assert_eq!(host.resources.gpus.idle(), 1);
    assert_eq!(host.resources.gpu_memory.idle(), GB2);

    f.manager.release_resources(host.id, &request).unwrap();
    let host = f.manager.get_host(host.id).unwrap();
    assert_eq!(host.resources.gpus.idle(), 2);
}

#[test]
fn test_report_preserves_in_flight_reservations() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    f.manager.reserve(host.id, 200, GB2).unwrap();

    let mut bigger = build_report(TEST_HOST);
    bigger.cores_per_proc = 800;
    let host = f.manager.create_or_update_host(&bigger).unwrap();
    assert_eq!(host.resources.cores.total(), 1600);
    assert_eq!(host.resources.cores.idle(), 1400);
    assert_eq!(host.resources.memory.idle(), GB16 - MB512 - GB2);
}

#[test]
fn test_stranded_cores() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    assert_eq!(f.manager.stranded_core_units(host.id).unwrap(), 0);

    // 2GB 空闲内存仍可调度
    f.manager.reserve(host.id, 0, GB16 - MB512 - GB2).unwrap();
    assert_eq!(f.manager.stranded_core_units(host.id).unwrap(), 0);

    // 只剩 1GB：全部 8 核搁浅
    f.manager.reserve(host.id, 0, GB).unwrap();
    assert_eq!(f.manager.stranded_core_units(host.id).unwrap(), 800);

    // 剩余 1.5 核：不足一核的零头不计入
    f.manager.reserve(host.id, 650, 0).unwrap();
    assert_eq!(f.manager.stranded_core_units(host.id).unwrap(), 100);

    // 空闲内存恰好够一个核心
    f.manager.release(host.id, 0, MB512).unwrap();
    assert_eq!(f.manager.stranded_core_units(host.id).unwrap(), 100);

    f.manager.release(host.id, 0, 1).unwrap();
    assert_eq!(f.manager.stranded_core_units(host.id).unwrap(), 0);
}

#[test]
fn test_stranded_cores_with_tiny_minimum_and_huge_memory() {
    let f = fixture_with(HostConfig {
        min_memory_per_core: 1024,
        ..HostConfig::default()
    });
    let mut report = build_report(TEST_HOST);
    report.total_memory = i64::MAX;
    report.free_memory = i64::MAX;
    let host = f.manager.create_or_update_host(&report).unwrap();
    assert_eq!(f.manager.stranded_core_units(host.id).unwrap(), 0);
}

#[test]
fn test_update_thread_mode() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    assert_eq!(host.thread_mode, ThreadMode::Auto);

    f.manager.set_thread_mode(host.id, ThreadMode::Variable).unwrap();
    assert_eq!(
        f.manager.get_host(host.id).unwrap().thread_mode,
        ThreadMode::Variable
    );
    f.manager.set_thread_mode(host.id, ThreadMode::All).unwrap();
    assert_eq!(f.manager.get_host(host.id).unwrap().thread_mode, ThreadMode::All);
}

#[test]
fn test_is_host_locked() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    assert!(!f.manager.is_host_locked(host.id).unwrap());

    f.manager
        .set_lock(host.id, LockState::Locked, Source::new("admin"))
        .unwrap();
    assert!(f.manager.is_host_locked(host.id).unwrap());
    let locked = f.manager.get_host(host.id).unwrap();
    assert!(!locked.is_dispatchable());
    let change = locked.last_lock_change.unwrap();
    assert_eq!(change.state, LockState::Locked);
    assert_eq!(change.source, Source::new("admin"));

    f.manager
        .set_lock(host.id, LockState::Open, Source::new("admin"))
        .unwrap();
    assert!(!f.manager.is_host_locked(host.id).unwrap());
}

#[test]
fn test_admin_cannot_set_nimby_lock_state() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    let err = f
        .manager
        .set_lock(host.id, LockState::NimbyLocked, Source::new("admin"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidLockState(_)));
    assert!(err.is_rejected_input());
    assert_eq!(f.manager.get_host(host.id).unwrap(), host);
}

#[test]
fn test_nimby_lock() {
    let f = fixture();
    let mut report = build_report(TEST_HOST);
    report.nimby_enabled = true;
    let host = f.manager.create_or_update_host(&report).unwrap();
    assert!(f.manager.is_nimby_host(host.id).unwrap());

    f.manager
        .set_nimby_lock(host.id, true, Source::new("nimby"))
        .unwrap();
    let host = f.manager.get_host(host.id).unwrap();
    assert_eq!(host.effective_lock_state(), LockState::NimbyLocked);
    assert!(!host.is_locked());
    assert!(!host.is_dispatchable());
}

#[test]
fn test_is_host_up() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    assert!(f.manager.is_host_up(host.id).unwrap());

    f.manager
        .set_hardware_state(host.id, HardwareState::Down)
        .unwrap();
    assert!(!f.manager.is_host_up(host.id).unwrap());

    // DOWN 主机仍然接受资源更新
    f.manager.reserve(host.id, 100, GB).unwrap();
}

#[test]
fn test_reboot_when_idle() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    assert!(!host.reboot_when_idle);

    f.manager.set_reboot_when_idle(host.id, true).unwrap();
    let host = f.manager.get_host(host.id).unwrap();
    assert!(host.reboot_when_idle);
    assert!(host.should_reboot());
}

#[test]
fn test_tags() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    assert_eq!(host.tags.to_storage_string(), "unassigned beta 64bit linux");

    assert!(f.manager.add_manual_tag(host.id, "frick").unwrap());
    assert!(f.manager.add_manual_tag(host.id, "jack").unwrap());
    assert!(!f.manager.add_manual_tag(host.id, "jack").unwrap());
    let host = f.manager.recalculate_tags(host.id).unwrap();
    assert_eq!(
        host.tags.to_storage_string(),
        "unassigned beta 64bit linux frick jack"
    );

    assert!(f.manager.remove_manual_tag(host.id, "frick").unwrap());
    assert!(!f.manager.remove_manual_tag(host.id, "linux").unwrap());
    let host = f.manager.recalculate_tags(host.id).unwrap();
    assert_eq!(host.tags.to_storage_string(), "unassigned beta 64bit linux jack");

    assert!(matches!(
        f.manager.add_manual_tag(host.id, "two words"),
        Err(LedgerError::InvalidTag { .. })
    ));
}

#[test]
fn test_set_allocation_replaces_allocation_tag() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    f.manager.add_manual_tag(host.id, "frick").unwrap();
    let prod = f.directory.register(Allocation::new("film.prod")).unwrap();

    f.manager.set_allocation(host.id, Some(prod)).unwrap();
    let host = f.manager.get_host(host.id).unwrap();
    assert_eq!(host.tags.to_storage_string(), "film.prod beta 64bit linux frick");

    f.manager.set_allocation(host.id, None).unwrap();
    let host = f.manager.get_host(host.id).unwrap();
    assert_eq!(host.tags.to_storage_string(), "unassigned beta 64bit linux frick");

    assert!(matches!(
        f.manager
            .set_allocation(host.id, Some(host_ledger_domain::AllocationId::new())),
        Err(LedgerError::UnknownAllocation { .. })
    ));
}

#[test]
fn test_unknown_host() {
    let f = fixture();
    let id = HostId::new();
    assert!(matches!(
        f.manager.reserve(id, 100, GB),
        Err(LedgerError::UnknownHost { .. })
    ));
    assert!(matches!(
        f.manager.set_thread_mode(id, ThreadMode::All),
        Err(LedgerError::UnknownHost { .. })
    ));
    assert!(matches!(
        f.manager.find_host("nowhere"),
        Err(LedgerError::UnknownHost { .. })
    ));
    assert!(!f.manager.host_exists("nowhere").unwrap());
}

#[test]
fn test_invalid_report_is_rejected() {
    let f = fixture();
    let mut report = build_report(TEST_HOST);
    report.total_memory = (MB512 - 1) as i64;
    report.free_memory = 0;
    let err = f.manager.create_or_update_host(&report).unwrap_err();
    assert!(err.is_rejected_input());
    assert!(!f.manager.host_exists(TEST_HOST).unwrap());
}

#[test]
fn test_host_name_that_is_not_a_valid_tag_is_rejected() {
    let f = fixture();
    for name in ["render node", "render\tnode"] {
        assert!(matches!(
            f.manager.create_or_update_host(&build_report(name)),
            Err(LedgerError::InvalidCapacity(_))
        ));
    }
    let long = "x".repeat(65);
    assert!(matches!(
        f.manager.create_or_update_host(&build_report(&long)),
        Err(LedgerError::InvalidCapacity(_))
    ));
    assert!(f.manager.list_hosts().unwrap().is_empty());
}

#[test]
fn test_every_host_tag_set_starts_with_allocation_and_name() {
    let f = fixture();
    assert!(matches!(
        f.directory.register(Allocation::new("Film Prod")),
        Err(LedgerError::InvalidTag { .. })
    ));
    let prod = f
        .directory
        .register(Allocation::new("film.prod").with_tag("Prod"))
        .unwrap();

    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    f.manager.set_allocation(host.id, Some(prod)).unwrap();
    let host = f.manager.get_host(host.id).unwrap();
    let head: Vec<_> = host.tags.iter().take(2).collect();
    assert_eq!(head, vec!["prod", TEST_HOST]);
}

#[test]
fn test_delete_host() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    f.manager.delete_host(host.id).unwrap();
    assert!(!f.manager.host_exists(TEST_HOST).unwrap());
    assert!(matches!(
        f.manager.delete_host(host.id),
        Err(LedgerError::UnknownHost { .. })
    ));
}

#[test]
fn test_delete_down_hosts() {
    let f = fixture();
    let mut ids = Vec::new();
    for i in 0..3 {
        let host = f
            .manager
            .create_or_update_host(&build_report(&format!("{TEST_HOST}{i}")))
            .unwrap();
        ids.push(host.id);
    }
    f.manager.set_hardware_state(ids[0], HardwareState::Down).unwrap();
    f.manager.set_hardware_state(ids[2], HardwareState::Down).unwrap();

    assert_eq!(f.manager.delete_down_hosts().unwrap(), 2);
    assert!(f.manager.host_exists("beta1").unwrap());
    assert!(!f.manager.host_exists("beta0").unwrap());
    assert!(!f.manager.host_exists("beta2").unwrap());
    assert_eq!(f.manager.delete_down_hosts().unwrap(), 0);
}

#[test]
fn test_concurrent_reservations_never_overbook() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let manager = f.manager.clone();
            let id = host.id;
            thread::spawn(move || manager.reserve(id, 100, GB).is_ok())
        })
        .collect();
    let granted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(granted, 8);
    let host = f.manager.get_host(host.id).unwrap();
    assert_eq!(host.resources.cores.idle(), 0);
    assert_eq!(host.resources.memory.idle(), GB16 - MB512 - 8 * GB);
}

#[test]
fn test_concurrent_reports_and_reservations_converge() {
    let f = fixture();
    let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();
    let mut bigger = build_report(TEST_HOST);
    bigger.cores_per_proc = 1200;
    bigger.total_memory = GB32 as i64;

    let reporter = {
        let manager = f.manager.clone();
        let report = bigger.clone();
        thread::spawn(move || {
            manager.create_or_update_host(&report).unwrap();
        })
    };
    let reserver = {
        let manager = f.manager.clone();
        let id = host.id;
        thread::spawn(move || {
            manager.reserve(id, 400, GB4).unwrap();
        })
    };
    reporter.join().unwrap();
    reserver.join().unwrap();

    let host = f.manager.get_host(host.id).unwrap();
    assert_eq!(host.resources.cores.idle(), 2000);
    assert_eq!(host.resources.memory.idle(), GB32 - MB512 - GB4);
}

#[test]
fn test_delete_racing_reports_never_duplicates_host() {
    for _ in 0..50 {
        let f = fixture();
        let host = f.manager.create_or_update_host(&build_report(TEST_HOST)).unwrap();

        let deleter = {
            let manager = f.manager.clone();
            thread::spawn(move || manager.delete_host(host.id))
        };
        let reporters: Vec<_> = (0..4)
            .map(|_| {
                let manager = f.manager.clone();
                thread::spawn(move || manager.create_or_update_host(&build_report(TEST_HOST)))
            })
            .collect();

        deleter.join().unwrap().unwrap();
        for reporter in reporters {
            reporter.join().unwrap().unwrap();
        }
        assert!(f.manager.list_hosts().unwrap().len() <= 1);
    }
}
