use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;

use lineup_core::{
    ApplicationError, Booking, ClientId, DispatchOutcome, DomainError, EntryMode, FrontDesk,
    InMemoryNotifier, OwnerId, Recipient, ServiceId, Slot, SlotTime,
};
use lineup_db::{connect_with_settings, migrations, SqlLineupRepository};

type BookingTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

struct Harness {
    _dir: TempDir,
    desk: Arc<FrontDesk<SqlLineupRepository, InMemoryNotifier>>,
    notifier: Arc<InMemoryNotifier>,
}

/// File-backed database so several pooled connections really run concurrently.
async fn harness() -> BookingTestResult<Harness> {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let url = format!("sqlite://{}", dir.path().join("lineup.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.map_err(|err| err.to_string())?;
    migrations::run_pending(&pool).await.map_err(|err| err.to_string())?;

    let notifier = Arc::new(InMemoryNotifier::default());
    let desk =
        Arc::new(FrontDesk::new(Arc::new(SqlLineupRepository::new(pool)), notifier.clone()));
    Ok(Harness { _dir: dir, desk, notifier })
}

fn time(raw: &str) -> SlotTime {
    raw.parse().unwrap_or_else(|_| panic!("invalid test time {raw}"))
}

async fn haircut(
    desk: &FrontDesk<SqlLineupRepository, InMemoryNotifier>,
    owner: OwnerId,
) -> BookingTestResult<ServiceId> {
    desk.add_service(owner, "Haircut").await.map_err(|err| err.to_string())?;
    let services = desk.list_services(owner).await.map_err(|err| err.to_string())?;
    services.first().map(|service| service.id).ok_or_else(|| "service should exist".to_string())
}

#[tokio::test]
async fn second_client_on_same_slot_gets_conflict_and_slot_disappears() -> BookingTestResult {
    let Harness { _dir, desk, notifier } = harness().await?;
    let owner = OwnerId(1001);
    let provider =
        desk.register_provider(owner, "Salon P").await.map_err(|err| err.to_string())?;
    let service = haircut(&desk, owner).await?;
    let date = NaiveDate::from_ymd_opt(2025, 8, 25).ok_or("valid date")?;
    let slot = Slot::new(date, time("10:00"));

    let booking = desk
        .enqueue_scheduled(provider.id, ClientId(1), service, slot)
        .await
        .map_err(|err| err.to_string())?;
    require!(booking.provider_notified);

    let second = desk.enqueue_scheduled(provider.id, ClientId(2), service, slot).await;
    require_eq!(
        second,
        Err::<Booking, _>(ApplicationError::Domain(DomainError::SlotConflict { slot }))
    );

    let available =
        desk.available_slots(provider.id, date).await.map_err(|err| err.to_string())?;
    require!(!available.contains(&time("10:00")), "booked slot must not be offered");
    require!(available.contains(&time("09:00")), "free slot must be offered");
    require_eq!(available.len(), 16);

    let delivered = notifier.delivered();
    require_eq!(delivered.len(), 1);
    require_eq!(delivered[0].recipient, Recipient(owner.0));
    Ok(())
}

#[tokio::test]
async fn walk_ins_are_called_in_order_then_queue_reports_empty() -> BookingTestResult {
    let Harness { _dir, desk, .. } = harness().await?;
    let owner = OwnerId(2002);
    let provider = desk.register_provider(owner, "Barber").await.map_err(|err| err.to_string())?;
    let service = haircut(&desk, owner).await?;

    let mut positions = Vec::new();
    for client in [11, 12, 13] {
        positions.push(
            desk.enqueue_walk_in(provider.id, ClientId(client), service)
                .await
                .map_err(|err| err.to_string())?,
        );
    }
    require_eq!(positions, vec![1, 2, 3]);

    for expected in [11, 12, 13] {
        let outcome = desk.call_next(owner).await.map_err(|err| err.to_string())?;
        require_eq!(outcome.called().map(|called| called.client_id), Some(ClientId(expected)));
    }
    let drained = desk.call_next(owner).await;
    require_eq!(drained, Ok::<_, ApplicationError>(DispatchOutcome::Empty));
    Ok(())
}

#[tokio::test]
async fn past_scheduled_entry_is_dispatched_once() -> BookingTestResult {
    let Harness { _dir, desk, notifier } = harness().await?;
    let owner = OwnerId(3003);
    let provider = desk.register_provider(owner, "Studio").await.map_err(|err| err.to_string())?;
    let service = haircut(&desk, owner).await?;
    let slot = Slot::parse("2025-08-20", "09:00").map_err(|err| err.to_string())?;

    desk.enqueue_scheduled(provider.id, ClientId(77), service, slot)
        .await
        .map_err(|err| err.to_string())?;

    let outcome = desk.call_next(owner).await.map_err(|err| err.to_string())?;
    let called = outcome.called().ok_or("scheduled entry should be dispatched")?;
    require_eq!(called.client_id, ClientId(77));
    require_eq!(called.mode, EntryMode::Scheduled { slot });
    require!(notifier.delivered().iter().any(|n| n.recipient == Recipient(77)));

    let drained = desk.call_next(owner).await;
    require_eq!(drained, Ok::<_, ApplicationError>(DispatchOutcome::Empty));
    Ok(())
}

#[tokio::test]
async fn walk_in_joining_after_a_booking_is_called_first() -> BookingTestResult {
    let Harness { _dir, desk, .. } = harness().await?;
    let owner = OwnerId(3103);
    let provider = desk.register_provider(owner, "Studio").await.map_err(|err| err.to_string())?;
    let service = haircut(&desk, owner).await?;
    let slot = Slot::parse("2025-08-20", "09:00").map_err(|err| err.to_string())?;

    desk.enqueue_scheduled(provider.id, ClientId(1), service, slot)
        .await
        .map_err(|err| err.to_string())?;
    desk.enqueue_walk_in(provider.id, ClientId(2), service)
        .await
        .map_err(|err| err.to_string())?;

    let mut called = Vec::new();
    loop {
        let outcome = desk.call_next(owner).await.map_err(|err| err.to_string())?;
        match outcome.called() {
            Some(client) => called.push(client.client_id),
            None => break,
        }
    }
    require_eq!(called, vec![ClientId(2), ClientId(1)]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_bookings_for_one_slot_admit_exactly_one() -> BookingTestResult {
    let Harness { _dir, desk, .. } = harness().await?;
    let owner = OwnerId(4004);
    let provider = desk.register_provider(owner, "Salon").await.map_err(|err| err.to_string())?;
    let service = haircut(&desk, owner).await?;
    let slot = Slot::parse("2025-09-01", "14:30").map_err(|err| err.to_string())?;

    let (first, second) = tokio::join!(
        desk.enqueue_scheduled(provider.id, ClientId(1), service, slot),
        desk.enqueue_scheduled(provider.id, ClientId(2), service, slot),
    );

    let successes = [&first, &second].iter().filter(|result| result.is_ok()).count();
    require_eq!(successes, 1);
    let conflict = [first, second].into_iter().find_map(Result::err);
    require_eq!(conflict, Some(ApplicationError::Domain(DomainError::SlotConflict { slot })));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_walk_ins_receive_distinct_positions() -> BookingTestResult {
    let Harness { _dir, desk, .. } = harness().await?;
    let owner = OwnerId(5005);
    let provider = desk.register_provider(owner, "Salon").await.map_err(|err| err.to_string())?;
    let service = haircut(&desk, owner).await?;

    let mut handles = Vec::new();
    for client in 0..8 {
        let desk = desk.clone();
        handles.push(tokio::spawn(async move {
            desk.enqueue_walk_in(provider.id, ClientId(100 + client), service).await
        }));
    }

    let mut positions = Vec::new();
    for handle in handles {
        let position =
            handle.await.map_err(|err| err.to_string())?.map_err(|err| err.to_string())?;
        positions.push(position);
    }
    positions.sort_unstable();
    require_eq!(positions, (1..=8).collect::<Vec<u32>>());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn busy_block_add_races_with_removal_without_failing() -> BookingTestResult {
    let Harness { _dir, desk, .. } = harness().await?;
    let owner = OwnerId(5105);
    desk.register_provider(owner, "Salon").await.map_err(|err| err.to_string())?;
    let slot = Slot::parse("2025-08-28", "12:00").map_err(|err| err.to_string())?;

    let adder = {
        let desk = desk.clone();
        tokio::spawn(async move {
            for _ in 0..25 {
                desk.add_busy_block(owner, slot).await?;
            }
            Ok::<_, ApplicationError>(())
        })
    };
    let remover = {
        let desk = desk.clone();
        tokio::spawn(async move {
            for _ in 0..25 {
                for block in desk.list_busy_blocks(owner).await? {
                    desk.remove_busy_block(owner, block.id).await?;
                }
            }
            Ok::<_, ApplicationError>(())
        })
    };

    adder.await.map_err(|err| err.to_string())?.map_err(|err| err.to_string())?;
    remover.await.map_err(|err| err.to_string())?.map_err(|err| err.to_string())?;

    let block = desk.add_busy_block(owner, slot).await.map_err(|err| err.to_string())?;
    require_eq!(block.slot, slot);
    Ok(())
}

#[tokio::test]
async fn unregister_leaves_nothing_behind() -> BookingTestResult {
    let Harness { _dir, desk, .. } = harness().await?;
    let owner = OwnerId(6006);
    let provider = desk.register_provider(owner, "Salon").await.map_err(|err| err.to_string())?;
    let service = haircut(&desk, owner).await?;
    let date = NaiveDate::from_ymd_opt(2025, 8, 27).ok_or("valid date")?;

    desk.enqueue_walk_in(provider.id, ClientId(1), service)
        .await
        .map_err(|err| err.to_string())?;
    desk.add_busy_block(owner, Slot::new(date, time("09:00")))
        .await
        .map_err(|err| err.to_string())?;
    desk.unregister(owner).await.map_err(|err| err.to_string())?;

    require!(matches!(
        desk.referral(provider.referral_code.as_str()).await,
        Err(ApplicationError::Domain(DomainError::ProviderNotFound { .. }))
    ));
    require!(matches!(
        desk.queue(owner, false).await,
        Err(ApplicationError::Domain(DomainError::NotRegistered { .. }))
    ));

    let again =
        desk.register_provider(owner, "Salon again").await.map_err(|err| err.to_string())?;
    require!(desk.queue(owner, false).await.map_err(|err| err.to_string())?.is_empty());
    require!(desk.list_services(owner).await.map_err(|err| err.to_string())?.is_empty());
    require!(again.id != provider.id);
    Ok(())
}
