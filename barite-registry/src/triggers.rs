//! Trigger lifecycle. Mirrors the rule lifecycle, but matches bus notices
//! by category/subtype instead of message text.

use std::sync::Arc;

use tracing::{info, warn};

use barite_model::Trigger;
use barite_types::{EventBody, InboundEvent, ItemId, ItemKind};

use crate::ports::{render_with_budget, MatcherSpec, Predicate, RenderContext};
use crate::{Registry, RegistryError, RegistryResult};

impl Registry {
    pub fn create_trigger(&self, parent: ItemId, mut trigger: Trigger) -> RegistryResult<ItemId> {
        self.validate_trigger(&trigger)?;
        if !self.inner.groups.lock().unwrap().contains_key(&parent) {
            return Err(RegistryError::NotFound(format!("group {parent}")));
        }
        trigger.parent_group = parent;

        let id = self.inner.ids.next()?;
        self.inner.trigger_store.put(id, &trigger)?;
        self.attach_item(parent, ItemKind::Trigger, id, &trigger.display_name)?;

        if trigger.active {
            if let Err(err) = self.register_trigger(id, &trigger) {
                let _ = self.inner.trigger_store.delete(id);
                let _ = self.detach_item(parent, ItemKind::Trigger, id);
                return Err(err);
            }
        }
        self.inner.triggers.lock().unwrap().insert(id, trigger);
        info!(id, "trigger created");
        Ok(id)
    }

    pub fn get_trigger(&self, id: ItemId) -> Option<Trigger> {
        self.inner.triggers.lock().unwrap().get(&id).cloned()
    }

    pub fn list_triggers(&self) -> Vec<(ItemId, Trigger)> {
        let mut out: Vec<_> = self
            .inner
            .triggers
            .lock()
            .unwrap()
            .iter()
            .map(|(id, t)| (*id, t.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    pub fn update_trigger(&self, id: ItemId, mut trigger: Trigger) -> RegistryResult<()> {
        self.validate_trigger(&trigger)?;
        let old = self
            .get_trigger(id)
            .ok_or_else(|| RegistryError::NotFound(format!("trigger {id}")))?;
        trigger.parent_group = old.parent_group;

        if old.active {
            self.unregister_trigger(id)?;
        }
        if trigger.active {
            if let Err(err) = self.register_trigger(id, &trigger) {
                if old.active {
                    if let Err(restore) = self.register_trigger(id, &old) {
                        warn!(id, %restore, "failed to restore previous matcher");
                    }
                }
                return Err(err);
            }
        }

        self.inner.trigger_store.put(id, &trigger)?;
        self.sync_item_name(
            trigger.parent_group,
            ItemKind::Trigger,
            id,
            &trigger.display_name,
        )?;
        self.inner.triggers.lock().unwrap().insert(id, trigger);
        Ok(())
    }

    pub fn delete_trigger(&self, id: ItemId) -> RegistryResult<()> {
        let trigger = self
            .get_trigger(id)
            .ok_or_else(|| RegistryError::NotFound(format!("trigger {id}")))?;

        let handle = self.inner.trigger_handles.lock().unwrap().remove(&id);
        match handle {
            Some(handle) => {
                if let Err(err) = self.inner.ports.dispatcher.unregister(handle) {
                    warn!(id, %err, "matcher unregister failed during delete");
                }
            }
            None if trigger.active => {
                warn!(id, "active trigger had no live matcher at delete");
            }
            None => {}
        }

        self.inner.trigger_store.delete(id)?;
        self.detach_item(trigger.parent_group, ItemKind::Trigger, id)?;
        self.inner.triggers.lock().unwrap().remove(&id);
        info!(id, "trigger deleted");
        Ok(())
    }

    fn validate_trigger(&self, trigger: &Trigger) -> RegistryResult<()> {
        if trigger.event_type.is_empty() {
            return Err(RegistryError::Validation(
                "a trigger needs an event type".to_string(),
            ));
        }
        self.inner
            .ports
            .renderer
            .check(&trigger.response_template)
            .map_err(|err| RegistryError::Validation(format!("bad template: {err}")))?;
        Ok(())
    }

    pub(crate) fn register_trigger(&self, id: ItemId, trigger: &Trigger) -> RegistryResult<()> {
        let predicate = compile_trigger_predicate(trigger);

        let renderer = Arc::clone(&self.inner.ports.renderer);
        let sender = Arc::clone(&self.inner.ports.sender);
        let template = trigger.response_template.clone();
        let budget = self.inner.render_budget;
        let handler = Arc::new(move |event: &InboundEvent| {
            let context = RenderContext {
                event: Some(event.raw.clone()),
            };
            match render_with_budget(&renderer, &template, context, budget) {
                Ok(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        sender.send(event.reply_target(), text);
                    }
                }
                Err(err) => warn!(trigger = id, %err, "response render failed"),
            }
        });

        let handle = self
            .inner
            .ports
            .dispatcher
            .register(MatcherSpec {
                predicate,
                priority: trigger.priority,
                block_following: trigger.block_following,
                handler,
            })
            .map_err(|err| RegistryError::Dispatch(err.to_string()))?;
        self.inner.trigger_handles.lock().unwrap().insert(id, handle);
        Ok(())
    }

    pub(crate) fn unregister_trigger(&self, id: ItemId) -> RegistryResult<()> {
        let handle = self
            .inner
            .trigger_handles
            .lock()
            .unwrap()
            .remove(&id)
            .ok_or_else(|| RegistryError::Integrity(format!("trigger {id} has no live matcher")))?;
        self.inner
            .ports
            .dispatcher
            .unregister(handle)
            .map_err(|err| RegistryError::Dispatch(err.to_string()))
    }
}

fn compile_trigger_predicate(trigger: &Trigger) -> Predicate {
    let (category, subtype) = trigger.category_parts();
    let category = category.to_string();
    let subtype = subtype.map(str::to_string);
    let group_filter = trigger.group_filter.clone();
    let user_filter = trigger.user_filter.clone();

    Arc::new(move |event: &InboundEvent| {
        let EventBody::Notice {
            category: event_category,
            subtype: event_subtype,
        } = &event.body
        else {
            return false;
        };
        if *event_category != category {
            return false;
        }
        // a bare category matches every subtype
        if let Some(wanted) = &subtype {
            if event_subtype != wanted {
                return false;
            }
        }
        if !group_filter.is_empty() && !group_filter.contains(&event.group_id) {
            return false;
        }
        if !user_filter.is_empty() && !user_filter.contains(&event.user_id) {
            return false;
        }
        true
    })
}
