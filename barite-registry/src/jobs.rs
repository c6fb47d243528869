//! Job lifecycle: scheduled broadcasts on 5-field cron expressions.
//!
//! A one-shot job (`run_once`) deletes itself after its first firing. The
//! scheduled task only holds a weak reference back to the registry, so a
//! dropped registry never keeps running tasks alive and vice versa.

use std::str::FromStr;
use std::sync::{Arc, Weak};

use cron::Schedule;
use tracing::{info, warn};

use barite_model::Job;
use barite_types::{ItemId, ItemKind, SendTarget};

use crate::ports::{render_with_budget, RenderContext};
use crate::registry::RegistryInner;
use crate::{Registry, RegistryError, RegistryResult};

impl Registry {
    pub fn create_job(&self, parent: ItemId, mut job: Job) -> RegistryResult<ItemId> {
        self.validate_job(&job)?;
        if !self.inner.groups.lock().unwrap().contains_key(&parent) {
            return Err(RegistryError::NotFound(format!("group {parent}")));
        }
        job.parent_group = parent;

        let id = self.inner.ids.next()?;
        self.inner.job_store.put(id, &job)?;
        self.attach_item(parent, ItemKind::Job, id, &job.display_name)?;

        if job.active {
            if let Err(err) = self.register_job(id, &job) {
                let _ = self.inner.job_store.delete(id);
                let _ = self.detach_item(parent, ItemKind::Job, id);
                return Err(err);
            }
        }
        self.inner.jobs.lock().unwrap().insert(id, job);
        info!(id, "job created");
        Ok(id)
    }

    pub fn get_job(&self, id: ItemId) -> Option<Job> {
        self.inner.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn list_jobs(&self) -> Vec<(ItemId, Job)> {
        let mut out: Vec<_> = self
            .inner
            .jobs
            .lock()
            .unwrap()
            .iter()
            .map(|(id, j)| (*id, j.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    pub fn update_job(&self, id: ItemId, mut job: Job) -> RegistryResult<()> {
        self.validate_job(&job)?;
        let old = self
            .get_job(id)
            .ok_or_else(|| RegistryError::NotFound(format!("job {id}")))?;
        job.parent_group = old.parent_group;

        if old.active {
            self.unregister_job(id)?;
        }
        if job.active {
            if let Err(err) = self.register_job(id, &job) {
                if old.active {
                    if let Err(restore) = self.register_job(id, &old) {
                        warn!(id, %restore, "failed to restore previous schedule");
                    }
                }
                return Err(err);
            }
        }

        self.inner.job_store.put(id, &job)?;
        self.sync_item_name(job.parent_group, ItemKind::Job, id, &job.display_name)?;
        self.inner.jobs.lock().unwrap().insert(id, job);
        Ok(())
    }

    pub fn delete_job(&self, id: ItemId) -> RegistryResult<()> {
        let job = self
            .get_job(id)
            .ok_or_else(|| RegistryError::NotFound(format!("job {id}")))?;

        let handle = self.inner.job_handles.lock().unwrap().remove(&id);
        match handle {
            Some(handle) => {
                if let Err(err) = self.inner.ports.scheduler.cancel(handle) {
                    warn!(id, %err, "schedule cancel failed during delete");
                }
            }
            None if job.active => {
                warn!(id, "active job had no live schedule at delete");
            }
            None => {}
        }

        self.inner.job_store.delete(id)?;
        self.detach_item(job.parent_group, ItemKind::Job, id)?;
        self.inner.jobs.lock().unwrap().remove(&id);
        info!(id, "job deleted");
        Ok(())
    }

    fn validate_job(&self, job: &Job) -> RegistryResult<()> {
        validate_cron_spec(&job.cron_spec)?;
        if job.recipients.users.is_empty() && job.recipients.groups.is_empty() {
            return Err(RegistryError::Validation(
                "a job needs at least one recipient".to_string(),
            ));
        }
        self.inner
            .ports
            .renderer
            .check(&job.action_template)
            .map_err(|err| RegistryError::Validation(format!("bad template: {err}")))?;
        Ok(())
    }

    pub(crate) fn register_job(&self, id: ItemId, job: &Job) -> RegistryResult<()> {
        let task = build_job_task(Arc::downgrade(&self.inner), id, job);
        let handle = self
            .inner
            .ports
            .scheduler
            .schedule(&job.cron_spec, task)
            .map_err(|err| RegistryError::Dispatch(err.to_string()))?;
        self.inner.job_handles.lock().unwrap().insert(id, handle);
        Ok(())
    }

    pub(crate) fn unregister_job(&self, id: ItemId) -> RegistryResult<()> {
        let handle = self
            .inner
            .job_handles
            .lock()
            .unwrap()
            .remove(&id)
            .ok_or_else(|| RegistryError::Integrity(format!("job {id} has no live schedule")))?;
        self.inner
            .ports
            .scheduler
            .cancel(handle)
            .map_err(|err| RegistryError::Dispatch(err.to_string()))
    }
}

/// 5-field cron expression (minute through day-of-week).
fn validate_cron_spec(spec: &str) -> RegistryResult<()> {
    if spec.split_whitespace().count() != 5 {
        return Err(RegistryError::Validation(format!(
            "cron expression needs 5 fields: {spec:?}"
        )));
    }
    // the parser wants a leading seconds field
    Schedule::from_str(&format!("0 {spec}"))
        .map_err(|err| RegistryError::Validation(format!("bad cron expression: {err}")))?;
    Ok(())
}

fn build_job_task(
    registry: Weak<RegistryInner>,
    id: ItemId,
    job: &Job,
) -> crate::ports::ScheduledTask {
    let template = job.action_template.clone();
    let recipients = job.recipients.clone();
    let run_once = job.run_once;

    Arc::new(move || {
        let Some(inner) = registry.upgrade() else {
            return;
        };
        match render_with_budget(
            &inner.ports.renderer,
            &template,
            RenderContext::default(),
            inner.render_budget,
        ) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    for user in &recipients.users {
                        inner.ports.sender.send(SendTarget::User(*user), text);
                    }
                    for group in &recipients.groups {
                        inner.ports.sender.send(SendTarget::Group(*group), text);
                    }
                }
            }
            Err(err) => warn!(job = id, %err, "action render failed"),
        }
        if run_once {
            let registry = Registry { inner };
            if let Err(err) = registry.delete_job(id) {
                warn!(job = id, %err, "one-shot job failed to delete itself");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_cron_accepted() {
        assert!(validate_cron_spec("0 0 * * *").is_ok());
        assert!(validate_cron_spec("*/5 9-17 * * 1-5").is_ok());
    }

    #[test]
    fn wrong_field_count_rejected() {
        assert!(validate_cron_spec("0 0 * *").is_err());
        assert!(validate_cron_spec("0 0 0 * * *").is_err());
        assert!(validate_cron_spec("").is_err());
    }

    #[test]
    fn garbage_fields_rejected() {
        assert!(validate_cron_spec("99 0 * * *").is_err());
        assert!(validate_cron_spec("a b c d e").is_err());
    }
}
