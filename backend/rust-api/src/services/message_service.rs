use anyhow::Context;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Collection, Database};
use uuid::Uuid;

use super::{ServiceError, ServiceResult};
use crate::access::{AccessError, Principal};
use crate::models::care::{Consultation, CreateMessageRequest, Message, MessageResponse};
use crate::models::StatusMessage;

/// Messaging inside consultations. Only the two participants write; admins may read.
pub struct MessageService {
    mongo: Database,
}

impl MessageService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn messages(&self) -> Collection<Message> {
        self.mongo.collection("messages")
    }

    pub async fn list(&self, principal: &Principal) -> ServiceResult<Vec<MessageResponse>> {
        self.find(principal.care_scope()).await
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> ServiceResult<MessageResponse> {
        Ok(self.scoped_message(principal, id).await?.into())
    }

    pub async fn create(
        &self,
        principal: &Principal,
        req: CreateMessageRequest,
    ) -> ServiceResult<MessageResponse> {
        let consultation = self.consultation(req.consultation_id).await?;
        if !principal.participates_in(&consultation) {
            return Err(AccessError::Forbidden(
                "You are not allowed to post in this consultation",
            )
            .into());
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            consultation_id: consultation.id,
            patient_id: consultation.patient_id,
            physician_id: consultation.physician_id,
            sender_id: principal.user_id.clone(),
            content: req.content,
            attachment_url: req.attachment_url,
            timestamp: Utc::now(),
            is_read: false,
        };

        self.messages()
            .insert_one(&message)
            .await
            .context("Failed to insert message")?;

        tracing::debug!(
            message_id = %message.id,
            consultation_id = %message.consultation_id,
            "Message sent"
        );
        Ok(message.into())
    }

    pub async fn delete(&self, principal: &Principal, id: &str) -> ServiceResult<()> {
        let message = self.scoped_message(principal, id).await?;
        if !principal.is_admin() && message.sender_id != principal.user_id {
            return Err(AccessError::Forbidden("Only the sender can delete a message").into());
        }
        self.messages()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete message")?;
        Ok(())
    }

    pub async fn mark_read(&self, principal: &Principal, id: &str) -> ServiceResult<StatusMessage> {
        let message = self.scoped_message(principal, id).await?;
        if message.is_read {
            return Ok(StatusMessage::new("Message already marked as read"));
        }
        self.messages()
            .update_one(doc! { "_id": id }, doc! { "$set": { "is_read": true } })
            .await
            .context("Failed to mark message as read")?;
        Ok(StatusMessage::new("Message marked as read"))
    }

    /// Marks as read every unread message the other participant sent in the consultation.
    pub async fn mark_all_read(
        &self,
        principal: &Principal,
        consultation_id: Option<String>,
    ) -> ServiceResult<StatusMessage> {
        let consultation = self.consultation(consultation_id).await?;
        let sender = consultation
            .counterpart_of(&principal.user_id)
            .ok_or(AccessError::Forbidden(
                "You are not allowed to access this consultation",
            ))?;

        let result = self
            .messages()
            .update_many(
                doc! {
                    "consultation_id": &consultation.id,
                    "sender_id": sender,
                    "is_read": false,
                },
                doc! { "$set": { "is_read": true } },
            )
            .await
            .context("Failed to mark messages as read")?;

        tracing::debug!(
            consultation_id = %consultation.id,
            updated = result.modified_count,
            "Messages marked as read"
        );
        Ok(StatusMessage::new("All messages marked as read"))
    }

    /// Unread messages the caller did not send.
    pub async fn unread(&self, principal: &Principal) -> ServiceResult<Vec<MessageResponse>> {
        self.find(principal.scoped(doc! {
            "is_read": false,
            "sender_id": { "$ne": principal.user_id.as_str() },
        }))
        .await
    }

    pub async fn by_consultation(
        &self,
        principal: &Principal,
        consultation_id: Option<String>,
    ) -> ServiceResult<Vec<MessageResponse>> {
        let consultation = self.consultation(consultation_id).await?;
        if !principal.can_read_consultation(&consultation) {
            return Err(AccessError::Forbidden(
                "You are not allowed to access this consultation",
            )
            .into());
        }
        self.find(doc! { "consultation_id": &consultation.id }).await
    }

    async fn consultation(&self, consultation_id: Option<String>) -> ServiceResult<Consultation> {
        let consultation_id = consultation_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::bad_request("consultation_id is required"))?;
        self.mongo
            .collection::<Consultation>("consultations")
            .find_one(doc! { "_id": consultation_id })
            .await
            .context("Failed to query consultation")?
            .ok_or_else(|| ServiceError::not_found("Consultation not found"))
    }

    async fn scoped_message(&self, principal: &Principal, id: &str) -> ServiceResult<Message> {
        self.messages()
            .find_one(principal.scoped(doc! { "_id": id }))
            .await
            .context("Failed to query message")?
            .ok_or_else(|| ServiceError::not_found("Message not found"))
    }

    async fn find(&self, filter: Document) -> ServiceResult<Vec<MessageResponse>> {
        let messages: Vec<Message> = self
            .messages()
            .find(filter)
            .sort(doc! { "timestamp": 1 })
            .await
            .context("Failed to query messages")?
            .try_collect()
            .await
            .context("Failed to read messages")?;
        Ok(messages.into_iter().map(MessageResponse::from).collect())
    }
}
