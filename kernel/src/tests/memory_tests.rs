//! Memory Protection Unit Tests
//!
//! `mprotect`/`munprotect` argument checking and page-table effects, and
//! what happens to a process that writes a protected page.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    use userlib::syscall::SyscallAbi;
    use userlib::thread::{thread_create, thread_join, StackPool};

    use crate::config::PAGE_SIZE;
    use crate::memory::PteFlags;
    use crate::process::ProcessError;
    use crate::tests::sim::Sim;

    const PAGE: u64 = PAGE_SIZE as u64;

    // ========================================
    // Page table effects
    // ========================================

    #[test]
    fn test_mprotect_clears_write_bit() {
        let sim = Sim::direct();
        let k = &sim.kernel;
        k.grow(2 * PAGE_SIZE as isize).unwrap();
        let space = k.current_space().unwrap();

        k.mprotect(PAGE, 2).unwrap();
        for page in [PAGE, 2 * PAGE] {
            let flags = space.flags(page).unwrap();
            assert!(flags.is_user_page());
            assert!(!flags.contains(PteFlags::WRITABLE));
            assert!(space.write(page, &[1]).is_err());
        }
        // Neighbours are untouched.
        assert!(space.flags(0).unwrap().contains(PteFlags::WRITABLE));

        k.munprotect(PAGE, 2).unwrap();
        assert!(space.flags(PAGE).unwrap().contains(PteFlags::WRITABLE));
        assert!(space.write(2 * PAGE, &[1]).is_ok());
    }

    #[test]
    fn test_mprotect_argument_checks() {
        let sim = Sim::direct();
        let k = &sim.kernel;
        k.grow(PAGE_SIZE as isize).unwrap();

        assert!(matches!(k.mprotect(PAGE + 1, 1), Err(ProcessError::InvalidArgument(_))));
        assert!(matches!(k.mprotect(PAGE, 0), Err(ProcessError::InvalidArgument(_))));
        assert!(matches!(k.munprotect(PAGE, -3), Err(ProcessError::InvalidArgument(_))));
        assert_eq!(k.mprotect(PAGE, 2), Err(ProcessError::BadAddress));
        assert_eq!(k.mprotect(2 * PAGE, 1), Err(ProcessError::BadAddress));

        let space = k.current_space().unwrap();
        assert!(space.flags(PAGE).unwrap().contains(PteFlags::WRITABLE));
    }

    #[test]
    fn test_mprotect_is_all_or_nothing() {
        let sim = Sim::direct();
        let k = &sim.kernel;
        k.grow(3 * PAGE_SIZE as isize).unwrap();
        let space = k.current_space().unwrap();
        space.unmap(2 * PAGE);

        assert_eq!(k.mprotect(PAGE, 3), Err(ProcessError::BadAddress));
        assert!(space.flags(PAGE).unwrap().contains(PteFlags::WRITABLE));
        assert!(space.flags(3 * PAGE).unwrap().contains(PteFlags::WRITABLE));

        assert_eq!(k.mprotect(PAGE, 1), Ok(()));
        assert!(!space.flags(PAGE).unwrap().contains(PteFlags::WRITABLE));
    }

    #[test]
    fn test_fork_keeps_protection() {
        let sim = Sim::direct();
        let k = &sim.kernel;
        k.grow(PAGE_SIZE as isize).unwrap();
        k.mprotect(PAGE, 1).unwrap();

        let child = k.fork().unwrap();
        let table = k.lock_table();
        let space = table[table.find(child).unwrap()].space.clone().unwrap();
        assert!(!space.flags(PAGE).unwrap().contains(PteFlags::WRITABLE));
    }

    // ========================================
    // Faults
    // ========================================

    #[test]
    fn test_write_to_protected_page_kills_writer() {
        let (child, reaped, seen, wrote, after) = Sim::run(1, |os| {
            let page = os.alloc_page();
            os.write_u64(page, 1);
            os.mprotect(page, 1).unwrap();

            let seen = Arc::new(AtomicU64::new(0));
            let wrote = Arc::new(AtomicBool::new(false));
            let child = {
                let (seen, wrote) = (seen.clone(), wrote.clone());
                os.spawn(move |os| {
                    // Reading a protected page is fine.
                    seen.store(os.read_u64(page), Ordering::SeqCst);
                    os.write_u64(page, 2);
                    wrote.store(true, Ordering::SeqCst);
                })
            };
            let reaped = os.wait().unwrap();

            os.munprotect(page, 1).unwrap();
            os.write_u64(page, 3);
            (
                child,
                reaped,
                seen.load(Ordering::SeqCst),
                wrote.load(Ordering::SeqCst),
                os.read_u64(page),
            )
        });

        assert_eq!(reaped as i64, child);
        assert_eq!(seen, 1);
        assert!(!wrote, "write to a read-only page went through");
        assert_eq!(after, 3);
    }

    #[test]
    fn test_fault_kills_only_the_faulting_thread() {
        let (joined, survived) = Sim::run(1, |os| {
            let page = os.alloc_page();
            os.mprotect(page, 1).unwrap();

            let writer = os.entry(|os, page, _| os.write_u64(page, 7));
            let mut pool = StackPool::new();
            let tid = thread_create(os, &mut pool, writer, page, 0).unwrap();
            let joined = thread_join(os, &mut pool).unwrap();
            assert_eq!(joined, tid);

            // Still alive, and the page still holds zero.
            (joined, os.read_u64(page))
        });
        assert!(joined > 1);
        assert_eq!(survived, 0);
    }
}
