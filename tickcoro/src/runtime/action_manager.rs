use crate::runtime::action::{LatentAction, LatentResponse};
use crate::runtime::target::{Target, TargetId};
use dashmap::DashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::mem;

// Few targets own more than a handful of actions at once.
const INLINE_ACTIONS: usize = 4;

type Actions = SmallVec<[Box<dyn LatentAction>; INLINE_ACTIONS]>;

/// Per-tick table of latent actions keyed by (target, uuid).
///
/// Every method is safe to call from inside an action's own callbacks: no map
/// lock is held while an action runs, and actions are dropped after their slot
/// has been released. A slot whose action is being polled keeps its uuid
/// registered.
pub(crate) struct ActionManager {
    objects: DashMap<TargetId, ObjectActions>,

    /// Aborts requested since the last tick.
    aborts: Mutex<Vec<(TargetId, i32)>>,
}

struct ObjectActions {
    target: Target,
    slots: SmallVec<[ActionSlot; INLINE_ACTIONS]>,
}

struct ActionSlot {
    uuid: i32,

    /// `None` while the action is being polled or after it retired.
    action: Option<Box<dyn LatentAction>>,

    /// Reported done, waiting to be swept at the end of the tick.
    retired: bool,
}

impl ActionManager {
    pub(crate) fn new() -> Self {
        ActionManager {
            objects: DashMap::new(),
            aborts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn find_existing_action(&self, target: &Target, uuid: i32) -> bool {
        self.objects.get(&target.id()).is_some_and(|object| {
            object
                .slots
                .iter()
                .any(|slot| slot.uuid == uuid && !slot.retired)
        })
    }

    pub(crate) fn add_new_action(&self, target: &Target, uuid: i32, action: Box<dyn LatentAction>) {
        tracing::trace!(
            target_id = %target.id(),
            uuid,
            action = %action.description(),
            "latent action added"
        );

        self.objects
            .entry(target.id())
            .or_insert_with(|| ObjectActions {
                target: target.clone(),
                slots: SmallVec::new(),
            })
            .slots
            .push(ActionSlot {
                uuid,
                action: Some(action),
                retired: false,
            });
    }

    /// Queues an abort. The action is notified and removed on the next tick.
    pub(crate) fn abort_action(&self, target: &Target, uuid: i32) {
        self.aborts.lock().push((target.id(), uuid));
    }

    pub(crate) fn len(&self) -> usize {
        self.objects
            .iter()
            .map(|object| object.slots.iter().filter(|slot| !slot.retired).count())
            .sum()
    }

    /// Polls every registered action once.
    pub(crate) fn process_actions(&self) {
        self.process_aborts();

        let ids: SmallVec<[TargetId; 16]> = self.objects.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.process_object(id);
        }

        self.objects.retain(|_, object| {
            object.slots.retain(|slot| !slot.retired);
            !object.slots.is_empty()
        });
    }

    /// Drops every action. Used when the world goes away.
    pub(crate) fn shutdown(&self) {
        self.aborts.lock().clear();

        let ids: Vec<TargetId> = self.objects.iter().map(|e| *e.key()).collect();
        for id in ids {
            let Some((_, object)) = self.objects.remove(&id) else {
                continue;
            };

            // Dropping a pending coroutine may resume it, which may register
            // new actions, so the map entry must be gone first.
            let actions: Actions = object
                .slots
                .into_iter()
                .filter_map(|slot| slot.action)
                .collect();
            drop(actions);
        }
    }

    fn process_aborts(&self) {
        let aborts = mem::take(&mut *self.aborts.lock());

        for (id, uuid) in aborts {
            let mut removed = Actions::new();
            if let Some(mut object) = self.objects.get_mut(&id) {
                object.slots.retain(|slot| {
                    if slot.uuid != uuid || slot.retired {
                        return true;
                    }
                    if let Some(action) = slot.action.take() {
                        removed.push(action);
                    }
                    false
                });
            }

            for mut action in removed {
                tracing::debug!(target_id = %id, uuid, "latent action aborted");
                action.notify_action_aborted();
                drop(action);
            }
        }
    }

    fn process_object(&self, id: TargetId) {
        let Some(target) = self.objects.get(&id).map(|object| object.target.clone()) else {
            return;
        };

        if !target.is_valid() {
            let Some((_, object)) = self.objects.remove(&id) else {
                return;
            };

            for slot in object.slots {
                if let Some(mut action) = slot.action {
                    tracing::debug!(target_id = %id, uuid = slot.uuid, "latent action target destroyed");
                    action.notify_object_destroyed();
                    drop(action);
                }
            }
            return;
        }

        // Slots are only appended while we iterate. Actions added during this
        // pass wait for the next tick.
        let count = self.objects.get(&id).map_or(0, |object| object.slots.len());
        for index in 0..count {
            let taken = self.objects.get_mut(&id).and_then(|mut object| {
                object
                    .slots
                    .get_mut(index)
                    .and_then(|slot| slot.action.take())
            });
            let Some(mut action) = taken else {
                continue;
            };

            let mut response = LatentResponse::default();
            action.update_operation(&mut response);

            let (done, links) = response.into_parts();
            for (link, link_target) in links {
                link_target.record_link(link);
            }

            if let Some(mut object) = self.objects.get_mut(&id) {
                if let Some(slot) = object.slots.get_mut(index) {
                    if done {
                        slot.retired = true;
                    } else {
                        slot.action = Some(action);
                        continue;
                    }
                }
            }

            // Finished, or its slot vanished while it was being polled.
            drop(action);
        }
    }
}

impl fmt::Debug for ActionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionManager")
            .field("objects", &self.objects.len())
            .field("actions", &self.len())
            .finish()
    }
}
