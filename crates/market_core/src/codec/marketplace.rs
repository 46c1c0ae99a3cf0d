//! `MARKETPLACE` record layout. Members are listed under `MARKETPLACEAPPS`.

use super::xml::{TagWriter, XmlNode};
use super::{
    int_field, read_attributes, read_permissions, text_field, write_attributes,
    write_permissions, DecodeError,
};
use crate::model::entry::EntryKind;
use crate::model::marketplace::Marketplace;
use crate::model::owner::Owner;
use std::collections::BTreeSet;

const MEMBERS_TAG: &str = "MARKETPLACEAPPS";

pub(super) fn encode(mp: &Marketplace) -> String {
    let root_tag = EntryKind::Marketplace.spec().root_tag;
    let mut writer = TagWriter::new();
    writer
        .open(root_tag)
        .field("ID", mp.id)
        .field("UID", mp.owner.uid)
        .field("GID", mp.owner.gid)
        .field("UNAME", &mp.owner.uname)
        .field("GNAME", &mp.owner.gname)
        .field("NAME", &mp.name)
        .field("MARKET_MAD", &mp.market_mad)
        .field("DESCRIPTION", &mp.description);
    write_permissions(&mut writer, &mp.permissions);
    writer.open(MEMBERS_TAG);
    for id in &mp.members {
        writer.field("ID", id);
    }
    writer.close(MEMBERS_TAG);
    write_attributes(&mut writer, &mp.attributes);
    writer.close(root_tag);
    writer.finish()
}

pub(super) fn decode(root: &XmlNode) -> Result<Marketplace, DecodeError> {
    Ok(Marketplace {
        id: int_field(root, "ID")?,
        name: text_field(root, "NAME")?,
        owner: Owner {
            uid: int_field(root, "UID")?,
            gid: int_field(root, "GID")?,
            uname: text_field(root, "UNAME")?,
            gname: text_field(root, "GNAME")?,
        },
        permissions: read_permissions(root)?,
        description: text_field(root, "DESCRIPTION")?,
        market_mad: text_field(root, "MARKET_MAD")?,
        members: read_members(root)?,
        attributes: read_attributes(root)?,
    })
}

fn read_members(root: &XmlNode) -> Result<BTreeSet<i64>, DecodeError> {
    let node = root
        .child(MEMBERS_TAG)
        .ok_or(DecodeError::MissingField(MEMBERS_TAG))?;
    let mut members = BTreeSet::new();
    for child in &node.children {
        if child.name != "ID" {
            return Err(DecodeError::InvalidField {
                field: MEMBERS_TAG,
                value: child.name.clone(),
            });
        }
        let id = child
            .text
            .trim()
            .parse::<i64>()
            .map_err(|_| DecodeError::InvalidField {
                field: MEMBERS_TAG,
                value: child.text.clone(),
            })?;
        members.insert(id);
    }
    Ok(members)
}
