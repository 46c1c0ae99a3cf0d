use market_core::db::open_db_in_memory;
use market_core::{
    AttributeBag, ClusterRole, EntryId, EntryKind, ObjectPool, Owner, PoolConfig, PoolError,
    DEFAULT_UMASK,
};

fn pool() -> ObjectPool {
    let conn = open_db_in_memory().unwrap();
    ObjectPool::new(conn, PoolConfig::for_role(ClusterRole::Standalone)).unwrap()
}

fn admin() -> Owner {
    Owner::new(0, 0, "oneadmin", "oneadmin")
}

fn alice() -> Owner {
    Owner::new(7, 100, "alice", "users")
}

fn attrs(pairs: &[(&str, &str)]) -> AttributeBag {
    pairs.iter().copied().collect()
}

fn new_marketplace(pool: &ObjectPool, name: &str) -> EntryId {
    pool.allocate_marketplace(&admin(), DEFAULT_UMASK, attrs(&[("NAME", name)]))
        .unwrap()
}

fn new_app(pool: &ObjectPool, name: &str, marketplace: Option<EntryId>) -> EntryId {
    pool.allocate_app(&alice(), DEFAULT_UMASK, attrs(&[("NAME", name)]), marketplace)
        .unwrap()
}

#[test]
fn allocate_marketplace_defaults_driver() {
    let pool = pool();
    let id = pool
        .allocate_marketplace(
            &admin(),
            DEFAULT_UMASK,
            attrs(&[("NAME", "Public"), ("DESCRIPTION", "Community appliances")]),
        )
        .unwrap();
    assert_eq!(id, 0);

    let mp = pool.get_marketplace("Public").unwrap();
    assert_eq!(mp.id, id);
    assert_eq!(mp.market_mad, "http");
    assert_eq!(mp.attributes.get("MARKET_MAD"), Some("http"));
    assert_eq!(mp.description, "Community appliances");
    assert!(!mp.attributes.contains("NAME"));
    assert!(mp.members.is_empty());

    let custom = pool
        .allocate_marketplace(
            &admin(),
            DEFAULT_UMASK,
            attrs(&[("NAME", "Private"), ("MARKET_MAD", "s3")]),
        )
        .unwrap();
    assert_eq!(pool.get_marketplace_by_id(custom).unwrap().market_mad, "s3");
}

#[test]
fn marketplace_names_are_global() {
    let pool = pool();
    let first = new_marketplace(&pool, "Shared");

    match pool
        .allocate_marketplace(&alice(), DEFAULT_UMASK, attrs(&[("NAME", "Shared")]))
        .unwrap_err()
    {
        PoolError::DuplicateName {
            kind, existing_id, ..
        } => {
            assert_eq!(kind, EntryKind::Marketplace);
            assert_eq!(existing_id, first);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(matches!(
        pool.get_marketplace("Missing").unwrap_err(),
        PoolError::NotFound {
            kind: EntryKind::Marketplace,
            ..
        }
    ));
}

#[test]
fn allocating_app_into_marketplace_lists_it() {
    let pool = pool();
    let mp_id = new_marketplace(&pool, "Public");
    let app_id = new_app(&pool, "ubuntu", Some(mp_id));

    let mp = pool.get_marketplace_by_id(mp_id).unwrap();
    assert!(mp.members.contains(&app_id));

    let app = pool.get_app_by_id(app_id).unwrap();
    assert_eq!(app.marketplace_id, mp_id);
    assert_eq!(app.marketplace_name, "Public");
}

#[test]
fn allocating_app_into_missing_marketplace_writes_nothing() {
    let pool = pool();
    let err = pool
        .allocate_app(&alice(), DEFAULT_UMASK, attrs(&[("NAME", "orphan")]), Some(5))
        .unwrap_err();
    assert!(matches!(
        err,
        PoolError::NotFound {
            kind: EntryKind::Marketplace,
            ..
        }
    ));
    assert!(matches!(
        pool.get_app("orphan", 7).unwrap_err(),
        PoolError::NotFound { .. }
    ));
    assert_eq!(new_app(&pool, "orphan", None), 0);
}

#[test]
fn non_empty_marketplace_cannot_be_dropped() {
    let pool = pool();
    let mp_id = new_marketplace(&pool, "Public");
    let app_id = new_app(&pool, "ubuntu", Some(mp_id));

    let mp = pool.get_marketplace_by_id(mp_id).unwrap();
    match pool.drop_marketplace(&mp).unwrap_err() {
        PoolError::NotEmpty { id } => assert_eq!(id, mp_id),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pool.get_marketplace_by_id(mp_id).unwrap(), mp);

    assert!(pool.remove_app_from_marketplace(mp_id, app_id).unwrap());
    let emptied = pool.get_marketplace_by_id(mp_id).unwrap();
    pool.drop_marketplace(&emptied).unwrap();
    assert!(pool
        .stored_body(EntryKind::Marketplace, mp_id)
        .unwrap()
        .is_none());

    let app = pool.get_app_by_id(app_id).unwrap();
    assert_eq!(app.marketplace_id, -1);
    assert_eq!(app.marketplace_name, "");
}

#[test]
fn stale_empty_snapshot_does_not_bypass_membership_check() {
    let pool = pool();
    let mp_id = new_marketplace(&pool, "Public");
    let snapshot = pool.get_marketplace_by_id(mp_id).unwrap();
    new_app(&pool, "ubuntu", Some(mp_id));

    assert!(matches!(
        pool.drop_marketplace(&snapshot).unwrap_err(),
        PoolError::NotEmpty { .. }
    ));
    assert!(pool.get_marketplace_by_id(mp_id).is_ok());
}

#[test]
fn adding_app_moves_it_between_marketplaces() {
    let pool = pool();
    let public = new_marketplace(&pool, "Public");
    let private = new_marketplace(&pool, "Private");
    let app_id = new_app(&pool, "ubuntu", Some(public));

    pool.add_app_to_marketplace(private, app_id).unwrap();

    assert!(!pool
        .get_marketplace_by_id(public)
        .unwrap()
        .members
        .contains(&app_id));
    assert!(pool
        .get_marketplace_by_id(private)
        .unwrap()
        .members
        .contains(&app_id));
    let app = pool.get_app_by_id(app_id).unwrap();
    assert_eq!(app.marketplace_id, private);
    assert_eq!(app.marketplace_name, "Private");

    pool.add_app_to_marketplace(private, app_id).unwrap();
    assert_eq!(pool.get_marketplace_by_id(private).unwrap().members.len(), 1);
}

#[test]
fn membership_changes_reject_unknown_entries() {
    let pool = pool();
    let mp_id = new_marketplace(&pool, "Public");
    let app_id = new_app(&pool, "ubuntu", None);

    assert!(matches!(
        pool.add_app_to_marketplace(mp_id, 77).unwrap_err(),
        PoolError::NotFound {
            kind: EntryKind::App,
            ..
        }
    ));
    assert!(matches!(
        pool.add_app_to_marketplace(77, app_id).unwrap_err(),
        PoolError::NotFound {
            kind: EntryKind::Marketplace,
            ..
        }
    ));
    assert!(!pool.remove_app_from_marketplace(mp_id, app_id).unwrap());
}

#[test]
fn dropping_app_unlists_it() {
    let pool = pool();
    let mp_id = new_marketplace(&pool, "Public");
    let app_id = new_app(&pool, "ubuntu", Some(mp_id));
    let keep_id = new_app(&pool, "debian", Some(mp_id));

    let app = pool.get_app_by_id(app_id).unwrap();
    pool.drop_app(&app).unwrap();

    let mp = pool.get_marketplace_by_id(mp_id).unwrap();
    assert!(!mp.members.contains(&app_id));
    assert!(mp.members.contains(&keep_id));
}

#[test]
fn update_marketplace_replaces_record() {
    let pool = pool();
    let mp_id = new_marketplace(&pool, "Public");

    let mut mp = pool.get_marketplace_by_id(mp_id).unwrap();
    mp.description = "Curated".to_string();
    mp.attributes.set("ENDPOINT", "https://market.example/api");
    pool.update_marketplace(&mp).unwrap();
    assert_eq!(pool.get_marketplace_by_id(mp_id).unwrap(), mp);

    mp.id = 40;
    assert!(matches!(
        pool.update_marketplace(&mp).unwrap_err(),
        PoolError::NotFound { .. }
    ));
}

#[test]
fn stale_snapshot_update_keeps_stored_members() {
    let pool = pool();
    let mp_id = new_marketplace(&pool, "Public");
    let mut snapshot = pool.get_marketplace_by_id(mp_id).unwrap();
    let app_id = new_app(&pool, "ubuntu", Some(mp_id));

    snapshot.description = "Curated".to_string();
    pool.update_marketplace(&snapshot).unwrap();

    let stored = pool.get_marketplace_by_id(mp_id).unwrap();
    assert_eq!(stored.description, "Curated");
    assert!(stored.members.contains(&app_id));
    assert!(matches!(
        pool.drop_marketplace(&stored).unwrap_err(),
        PoolError::NotEmpty { .. }
    ));
    assert_eq!(pool.get_app_by_id(app_id).unwrap().marketplace_id, mp_id);
}

#[test]
fn update_marketplace_rejects_invalid_rename() {
    let pool = pool();
    let mp_id = new_marketplace(&pool, "Public");

    let mut mp = pool.get_marketplace_by_id(mp_id).unwrap();
    mp.name = "a|b".to_string();
    assert!(matches!(
        pool.update_marketplace(&mp).unwrap_err(),
        PoolError::InvalidName(_)
    ));
    assert_eq!(pool.get_marketplace_by_id(mp_id).unwrap().name, "Public");
}
