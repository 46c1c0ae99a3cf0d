use market_core::codec::{
    decode, decode_app, decode_marketplace, encode, encode_app, encode_marketplace,
    validate_document,
};
use market_core::{
    App, AppState, AttributeBag, CatalogEntry, DecodeError, EntryKind, Marketplace, Owner,
    Permissions, ValidationError,
};
use std::collections::BTreeSet;

fn sample_app() -> App {
    App {
        id: 42,
        name: "Ubuntu <22.04> & \"friends\"".to_string(),
        owner: Owner::new(7, 100, "alice", "users"),
        permissions: Permissions::from_mode(0o640),
        created_at: "1700000000".to_string(),
        origin: "3".to_string(),
        source: "http://marketplace.example/appliance/42/download".to_string(),
        checksum: "0f1e2d".to_string(),
        size_mb: 2048,
        description: "  leading and trailing spaces  ".to_string(),
        publisher: "Acme Appliances".to_string(),
        version: "1.2.3".to_string(),
        apptemplate64: "Q1BVPSIxIg==".to_string(),
        marketplace_id: 1,
        marketplace_name: "Public".to_string(),
        state: AppState::Ready,
        attributes: [
            ("DESCRIPTION", "  leading and trailing spaces  "),
            ("APPTEMPLATE64", "Q1BVPSIxIg=="),
            ("TAGS", "linux, <server>"),
        ]
        .into_iter()
        .collect(),
    }
}

fn sample_marketplace() -> Marketplace {
    Marketplace {
        id: 1,
        name: "Public".to_string(),
        owner: Owner::new(0, 0, "oneadmin", "oneadmin"),
        permissions: Permissions::from_mode(0o604),
        description: "Community appliances".to_string(),
        market_mad: "one".to_string(),
        members: BTreeSet::from([3, 42, 7]),
        attributes: [("MARKET_MAD", "one"), ("ENDPOINT", "https://x/?a=1&b=2")]
            .into_iter()
            .collect(),
    }
}

#[test]
fn app_roundtrips_field_for_field() {
    let app = sample_app();
    let text = encode_app(&app);
    assert_eq!(decode_app(&text).unwrap(), app);
}

#[test]
fn app_with_empty_fields_roundtrips() {
    let app = App::new(Owner::new(1, 1, "bob", "users"), 0o177, AttributeBag::new());
    let text = encode_app(&app);
    let decoded = decode_app(&text).unwrap();
    assert_eq!(decoded, app);
    assert_eq!(decoded.state, AppState::Init);
}

#[test]
fn marketplace_roundtrips_with_ordered_members() {
    let mp = sample_marketplace();
    let text = encode_marketplace(&mp);
    assert!(text.contains("<MARKETPLACEAPPS><ID>3</ID><ID>7</ID><ID>42</ID></MARKETPLACEAPPS>"));
    assert_eq!(decode_marketplace(&text).unwrap(), mp);
}

#[test]
fn generic_dispatch_matches_kind() {
    let entry = CatalogEntry::from(sample_marketplace());
    let text = encode(&entry);
    assert_eq!(decode(EntryKind::Marketplace, &text).unwrap(), entry);

    let err = decode(EntryKind::App, &text).unwrap_err();
    assert_eq!(
        err,
        DecodeError::UnexpectedRoot {
            expected: "MARKETPLACEAPP",
            found: "MARKETPLACE".to_string(),
        }
    );
}

#[test]
fn app_fields_are_written_in_canonical_order() {
    let text = encode_app(&sample_app());
    let order = [
        "<ID>", "<UID>", "<GID>", "<UNAME>", "<GNAME>", "<DATE>", "<NAME>", "<ORIGIN>",
        "<SOURCE>", "<CHECKSUM>", "<SIZE>", "<DESCRIPTION>", "<PUBLISHER>", "<VERSION>",
        "<APPTEMPLATE64>", "<MARKETPLACE_ID>", "<MARKETPLACE>", "<STATE>", "<PERMISSIONS>",
        "<TEMPLATE>",
    ];
    let positions: Vec<usize> = order.iter().map(|tag| text.find(tag).unwrap()).collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(text.starts_with("<MARKETPLACEAPP><ID>42</ID>"));
    assert!(text.contains("<STATE>1</STATE>"));
    assert!(text.contains("<OWNER_U>1</OWNER_U><OWNER_M>1</OWNER_M><OWNER_A>0</OWNER_A>"));
}

#[test]
fn missing_template_block_is_missing_attributes() {
    let text = strip_element(&encode_app(&sample_app()), "TEMPLATE");
    assert_eq!(decode_app(&text).unwrap_err(), DecodeError::MissingAttributes);

    let text = strip_element(&encode_marketplace(&sample_marketplace()), "TEMPLATE");
    assert_eq!(
        decode_marketplace(&text).unwrap_err(),
        DecodeError::MissingAttributes
    );
}

#[test]
fn missing_field_is_reported_by_name() {
    let text = strip_element(&encode_app(&sample_app()), "PUBLISHER");
    assert_eq!(
        decode_app(&text).unwrap_err(),
        DecodeError::MissingField("PUBLISHER")
    );

    let text = strip_element(&encode_app(&sample_app()), "PERMISSIONS");
    assert_eq!(
        decode_app(&text).unwrap_err(),
        DecodeError::MissingField("PERMISSIONS")
    );

    let text = strip_element(&encode_marketplace(&sample_marketplace()), "MARKETPLACEAPPS");
    assert_eq!(
        decode_marketplace(&text).unwrap_err(),
        DecodeError::MissingField("MARKETPLACEAPPS")
    );
}

#[test]
fn invalid_values_are_rejected() {
    let text = encode_app(&sample_app()).replace("<STATE>1</STATE>", "<STATE>7</STATE>");
    assert_eq!(
        decode_app(&text).unwrap_err(),
        DecodeError::InvalidField {
            field: "STATE",
            value: "7".to_string(),
        }
    );

    let text = encode_app(&sample_app()).replace("<SIZE>2048</SIZE>", "<SIZE>big</SIZE>");
    assert!(matches!(
        decode_app(&text).unwrap_err(),
        DecodeError::InvalidField { field: "SIZE", .. }
    ));

    assert!(matches!(
        decode_app("<MARKETPLACEAPP><ID>1</ID>").unwrap_err(),
        DecodeError::Malformed(_)
    ));
}

#[test]
fn validator_accepts_encoded_records() {
    validate_document(EntryKind::App, &encode_app(&sample_app())).unwrap();
    validate_document(
        EntryKind::Marketplace,
        &encode_marketplace(&sample_marketplace()),
    )
    .unwrap();
}

#[test]
fn validator_rejects_structural_problems() {
    let mut app = sample_app();
    app.attributes.set("9LIVES", "cat");
    assert_eq!(
        validate_document(EntryKind::App, &encode_app(&app)).unwrap_err(),
        ValidationError::InvalidAttributeKey("9LIVES".to_string())
    );

    let text = strip_element(&encode_app(&sample_app()), "VERSION");
    assert_eq!(
        validate_document(EntryKind::App, &text).unwrap_err(),
        ValidationError::MissingField("VERSION")
    );

    assert!(matches!(
        validate_document(EntryKind::Marketplace, &encode_app(&sample_app())).unwrap_err(),
        ValidationError::UnexpectedRoot { .. }
    ));
    assert!(matches!(
        validate_document(EntryKind::App, "<MARKETPLACEAPP>").unwrap_err(),
        ValidationError::Malformed(_)
    ));
}

#[test]
fn serde_view_matches_model() {
    let app = sample_app();
    let json = serde_json::to_string(&app).unwrap();
    assert!(json.contains("\"state\":\"READY\""));
    let back: App = serde_json::from_str(&json).unwrap();
    assert_eq!(back, app);
}

/// Removes the first `<TAG>...</TAG>` element from a flat record.
fn strip_element(text: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open).unwrap();
    let end = text[start..].find(&close).unwrap() + start + close.len();
    format!("{}{}", &text[..start], &text[end..])
}
