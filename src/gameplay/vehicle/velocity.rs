use bevy::prelude::*;
use parking_lot::Mutex;
use std::hint::spin_loop;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// World-space linear velocity of the chassis, m/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocitySample(pub Vec3);

impl VelocitySample {
    /// Ground-plane speed; vertical motion is ignored.
    pub fn horizontal_speed(&self) -> f32 {
        Vec2::new(self.0.x, self.0.z).length()
    }
}

/// Single-writer cell read under a sequence lock. An odd sequence means a write
/// is in progress.
#[derive(Debug, Default)]
pub struct VelocityCell {
    sequence: AtomicU32,
    x: AtomicU32,
    y: AtomicU32,
    z: AtomicU32,
}

impl VelocityCell {
    fn write(&self, sample: VelocitySample) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence
            .store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.x.store(sample.0.x.to_bits(), Ordering::Relaxed);
        self.y.store(sample.0.y.to_bits(), Ordering::Relaxed);
        self.z.store(sample.0.z.to_bits(), Ordering::Relaxed);

        self.sequence
            .store(sequence.wrapping_add(2), Ordering::Release);
    }

    fn read(&self) -> VelocitySample {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                spin_loop();
                continue;
            }

            let x = f32::from_bits(self.x.load(Ordering::Relaxed));
            let y = f32::from_bits(self.y.load(Ordering::Relaxed));
            let z = f32::from_bits(self.z.load(Ordering::Relaxed));

            fence(Ordering::Acquire);
            let after = self.sequence.load(Ordering::Relaxed);
            if before == after {
                return VelocitySample(Vec3::new(x, y, z));
            }
            spin_loop();
        }
    }
}

#[derive(Debug, Default)]
struct SubscriberRegistry {
    next_id: u64,
    cells: Vec<(u64, Arc<VelocityCell>)>,
}

/// Publishes chassis velocity once per physics step to every live subscription.
///
/// The feed only knows the cells it writes to. Subscriptions keep a weak link back so
/// they can deregister themselves, which means tearing the feed down first is fine.
#[derive(Component, Debug, Default)]
pub struct VelocityFeed {
    registry: Arc<Mutex<SubscriberRegistry>>,
}

impl VelocityFeed {
    pub fn subscribe(&self) -> VelocitySubscription {
        let cell = Arc::new(VelocityCell::default());
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id = registry.next_id.wrapping_add(1);
        registry.cells.push((id, Arc::clone(&cell)));

        VelocitySubscription {
            id,
            cell,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn publish(&self, sample: VelocitySample) {
        let registry = self.registry.lock();
        for (_, cell) in &registry.cells {
            cell.write(sample);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().cells.len()
    }
}

/// Reader side of a [`VelocityFeed`]. Dropping it deregisters the cell.
#[derive(Debug)]
pub struct VelocitySubscription {
    id: u64,
    cell: Arc<VelocityCell>,
    registry: Weak<Mutex<SubscriberRegistry>>,
}

impl VelocitySubscription {
    /// Newest published sample, zero until the first publish.
    pub fn latest(&self) -> VelocitySample {
        self.cell.read()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for VelocitySubscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        registry.lock().cells.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn latest_is_zero_before_first_publish() {
        let feed = VelocityFeed::default();
        let subscription = feed.subscribe();

        assert_eq!(subscription.latest(), VelocitySample(Vec3::ZERO));
    }

    #[test]
    fn publish_reaches_every_subscriber() {
        let feed = VelocityFeed::default();
        let first = feed.subscribe();
        let second = feed.subscribe();

        feed.publish(VelocitySample(Vec3::new(3.0, -1.0, 4.0)));

        assert_eq!(first.latest().0, Vec3::new(3.0, -1.0, 4.0));
        assert_eq!(second.latest().0, Vec3::new(3.0, -1.0, 4.0));
        assert_eq!(first.latest().horizontal_speed(), 5.0);
    }

    #[test]
    fn dropping_a_subscription_removes_it_from_the_feed() {
        let feed = VelocityFeed::default();
        let kept = feed.subscribe();
        let dropped = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);

        drop(dropped);
        assert_eq!(feed.subscriber_count(), 1);

        kept.unsubscribe();
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outlives_feed_and_keeps_last_value() {
        let feed = VelocityFeed::default();
        let subscription = feed.subscribe();
        feed.publish(VelocitySample(Vec3::new(1.0, 0.0, 0.0)));

        drop(feed);

        assert_eq!(subscription.latest().0, Vec3::new(1.0, 0.0, 0.0));
        drop(subscription);
    }

    #[test]
    fn subscriptions_dropped_on_other_threads_deregister() {
        let feed = Arc::new(VelocityFeed::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let subscription = feed.subscribe();
                let publisher = Arc::clone(&feed);
                thread::spawn(move || {
                    publisher.publish(VelocitySample(Vec3::X));
                    drop(subscription);
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("subscriber thread should finish");
        }

        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn readers_never_observe_a_torn_vector() {
        let feed = Arc::new(VelocityFeed::default());
        let subscription = feed.subscribe();

        let writer_feed = Arc::clone(&feed);
        let writer = thread::spawn(move || {
            for step in 0..20_000_u32 {
                let value = step as f32;
                writer_feed.publish(VelocitySample(Vec3::splat(value)));
            }
        });

        for _ in 0..20_000 {
            let sample = subscription.latest().0;
            assert_eq!(sample.x, sample.y);
            assert_eq!(sample.y, sample.z);
        }

        writer.join().expect("writer thread should finish");
    }
}
