use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::{
    dao::models::{
        CardAssignmentEntity, MarkedEventEntity, MemberEntity, PoolEventEntity, RoomEntity,
        RoomListItemEntity,
    },
    state::status::RoomStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMemberDocument {
    player_id: String,
    username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPoolEventDocument {
    id: String,
    text: String,
    author: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCardDocument {
    player_id: String,
    cells: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMarkedEventDocument {
    event_id: String,
    text: String,
    author: String,
}

/// Room document stored in the `rooms` collection, keyed by its code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    code: String,
    host: String,
    #[serde(default)]
    members: Vec<MongoMemberDocument>,
    #[serde(default)]
    event_pool: Vec<MongoPoolEventDocument>,
    status: RoomStatus,
    #[serde(default)]
    winner: Option<String>,
    #[serde(default)]
    card_assignments: Vec<MongoCardDocument>,
    #[serde(default)]
    marked_events: Vec<MongoMarkedEventDocument>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl MongoRoomDocument {
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            code: value.code,
            host: value.host,
            members: value
                .members
                .into_iter()
                .map(|member| MongoMemberDocument {
                    player_id: member.player_id,
                    username: member.username,
                })
                .collect(),
            event_pool: value
                .event_pool
                .into_iter()
                .map(|event| MongoPoolEventDocument {
                    id: event.id.to_string(),
                    text: event.text,
                    author: event.author,
                })
                .collect(),
            status: value.status,
            winner: value.winner,
            card_assignments: value
                .card_assignments
                .into_iter()
                .map(|card| MongoCardDocument {
                    player_id: card.player_id,
                    cells: card.cells.iter().map(Uuid::to_string).collect(),
                })
                .collect(),
            marked_events: value
                .marked_events
                .into_iter()
                .map(|marked| MongoMarkedEventDocument {
                    event_id: marked.event_id.to_string(),
                    text: marked.text,
                    author: marked.author,
                })
                .collect(),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoRoomDocument> for RoomEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoRoomDocument) -> Result<Self, Self::Error> {
        let code = value.code;
        let parse = |raw: &str| {
            Uuid::parse_str(raw).map_err(|err| MongoDaoError::MalformedRoom {
                code: code.clone(),
                reason: format!("invalid event id `{raw}`: {err}"),
            })
        };

        let event_pool = value
            .event_pool
            .into_iter()
            .map(|event| {
                Ok(PoolEventEntity {
                    id: parse(&event.id)?,
                    text: event.text,
                    author: event.author,
                })
            })
            .collect::<Result<Vec<_>, MongoDaoError>>()?;

        let card_assignments = value
            .card_assignments
            .into_iter()
            .map(|card| {
                Ok(CardAssignmentEntity {
                    player_id: card.player_id,
                    cells: card
                        .cells
                        .iter()
                        .map(|cell| parse(cell))
                        .collect::<Result<Vec<_>, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, MongoDaoError>>()?;

        let marked_events = value
            .marked_events
            .into_iter()
            .map(|marked| {
                Ok(MarkedEventEntity {
                    event_id: parse(&marked.event_id)?,
                    text: marked.text,
                    author: marked.author,
                })
            })
            .collect::<Result<Vec<_>, MongoDaoError>>()?;

        Ok(RoomEntity {
            host: value.host,
            members: value
                .members
                .into_iter()
                .map(|member| MemberEntity::new(member.player_id, member.username))
                .collect(),
            event_pool,
            status: value.status,
            winner: value.winner,
            card_assignments,
            marked_events,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            code,
        })
    }
}

impl From<&MongoRoomDocument> for RoomListItemEntity {
    fn from(value: &MongoRoomDocument) -> Self {
        Self {
            code: value.code.clone(),
            host: value.host.clone(),
            status: value.status,
            member_count: value.members.len(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

pub fn room_id(code: &str) -> Document {
    doc! {"_id": code}
}

pub fn member_document(member: &MemberEntity) -> Document {
    doc! {"player_id": &member.player_id, "username": &member.username}
}

pub fn pool_event_document(event: &PoolEventEntity) -> Document {
    doc! {"id": event.id.to_string(), "text": &event.text, "author": &event.author}
}

pub fn card_document(card: &CardAssignmentEntity) -> Document {
    let cells: Vec<String> = card.cells.iter().map(Uuid::to_string).collect();
    doc! {"player_id": &card.player_id, "cells": cells}
}

pub fn marked_event_document(marked: &MarkedEventEntity) -> Document {
    doc! {
        "event_id": marked.event_id.to_string(),
        "text": &marked.text,
        "author": &marked.author,
    }
}
