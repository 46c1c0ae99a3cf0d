//! `MARKETPLACEAPP` record layout.

use super::xml::{TagWriter, XmlNode};
use super::{
    int_field, read_attributes, read_permissions, text_field, write_attributes,
    write_permissions, DecodeError,
};
use crate::model::app::{App, AppState};
use crate::model::entry::EntryKind;
use crate::model::owner::Owner;

pub(super) fn encode(app: &App) -> String {
    let root_tag = EntryKind::App.spec().root_tag;
    let mut writer = TagWriter::new();
    writer
        .open(root_tag)
        .field("ID", app.id)
        .field("UID", app.owner.uid)
        .field("GID", app.owner.gid)
        .field("UNAME", &app.owner.uname)
        .field("GNAME", &app.owner.gname)
        .field("DATE", &app.created_at)
        .field("NAME", &app.name)
        .field("ORIGIN", &app.origin)
        .field("SOURCE", &app.source)
        .field("CHECKSUM", &app.checksum)
        .field("SIZE", app.size_mb)
        .field("DESCRIPTION", &app.description)
        .field("PUBLISHER", &app.publisher)
        .field("VERSION", &app.version)
        .field("APPTEMPLATE64", &app.apptemplate64)
        .field("MARKETPLACE_ID", app.marketplace_id)
        .field("MARKETPLACE", &app.marketplace_name)
        .field("STATE", app.state.code());
    write_permissions(&mut writer, &app.permissions);
    write_attributes(&mut writer, &app.attributes);
    writer.close(root_tag);
    writer.finish()
}

pub(super) fn decode(root: &XmlNode) -> Result<App, DecodeError> {
    let state_code = int_field(root, "STATE")?;
    let state = AppState::from_code(state_code).ok_or(DecodeError::InvalidField {
        field: "STATE",
        value: state_code.to_string(),
    })?;

    Ok(App {
        id: int_field(root, "ID")?,
        name: text_field(root, "NAME")?,
        owner: Owner {
            uid: int_field(root, "UID")?,
            gid: int_field(root, "GID")?,
            uname: text_field(root, "UNAME")?,
            gname: text_field(root, "GNAME")?,
        },
        permissions: read_permissions(root)?,
        created_at: text_field(root, "DATE")?,
        origin: text_field(root, "ORIGIN")?,
        source: text_field(root, "SOURCE")?,
        checksum: text_field(root, "CHECKSUM")?,
        size_mb: int_field(root, "SIZE")?,
        description: text_field(root, "DESCRIPTION")?,
        publisher: text_field(root, "PUBLISHER")?,
        version: text_field(root, "VERSION")?,
        apptemplate64: text_field(root, "APPTEMPLATE64")?,
        marketplace_id: int_field(root, "MARKETPLACE_ID")?,
        marketplace_name: text_field(root, "MARKETPLACE")?,
        state,
        attributes: read_attributes(root)?,
    })
}
