//! Scheduler Unit Tests
//!
//! Ticket accounting, table snapshots, and the lottery scheduler running
//! real processes on one or more simulated CPUs.

#[cfg(test)]
mod tests {
    use userlib::pstat::ProcStat as UserProcStat;
    use userlib::syscall::SyscallAbi;

    use crate::config::NPROC;
    use crate::process::{Pid, ProcState, ProcessError};
    use crate::tests::sim::Sim;

    fn ticks_of(stat: &UserProcStat, pid: u64) -> u64 {
        stat.entries()
            .find(|e| e.pid as u64 == pid)
            .map(|e| e.ticks as u64)
            .unwrap_or_else(|| panic!("pid {} missing from getpinfo", pid))
    }

    // ========================================
    // Tickets
    // ========================================

    #[test]
    fn test_settickets() {
        let sim = Sim::direct();
        let k = &sim.kernel;

        k.settickets(30).unwrap();
        assert!(matches!(k.settickets(0), Err(ProcessError::InvalidArgument(_))));
        assert!(matches!(k.settickets(-5), Err(ProcessError::InvalidArgument(_))));

        let table = k.lock_table();
        assert_eq!(table[table.init().unwrap().slot].tickets, 30);
    }

    #[test]
    fn test_children_inherit_tickets() {
        let sim = Sim::direct();
        let k = &sim.kernel;
        let before = k.fork().unwrap();
        k.settickets(5).unwrap();
        let after = k.fork().unwrap();

        let table = k.lock_table();
        assert_eq!(table[table.find(before).unwrap()].tickets, 1);
        assert_eq!(table[table.find(after).unwrap()].tickets, 5);
    }

    // ========================================
    // Introspection
    // ========================================

    #[test]
    fn test_getpinfo_snapshot() {
        let sim = Sim::direct();
        let k = &sim.kernel;
        let a = k.fork().unwrap();
        k.settickets(5).unwrap();
        let b = k.fork().unwrap();
        {
            let mut table = k.lock_table();
            let slot = table.find(a).unwrap();
            table[slot].ticks = 17;
        }

        let stat = k.getpinfo();
        assert_eq!(&stat.inuse[..3], &[1, 1, 1]);
        assert_eq!(&stat.pid[..3], &[1, a.0 as i32, b.0 as i32]);
        assert_eq!(&stat.tickets[..3], &[5, 1, 5]);
        assert_eq!(stat.ticks[1], 17);
        for slot in 3..NPROC {
            assert_eq!(
                (stat.inuse[slot], stat.tickets[slot], stat.pid[slot], stat.ticks[slot]),
                (0, 0, 0, 0)
            );
        }

        // A reclaimed slot reads as unused again.
        {
            let mut table = k.lock_table();
            let slot = table.find(b).unwrap();
            table[slot].state = ProcState::Zombie;
        }
        k.wait().unwrap();
        assert_eq!(k.getpinfo().inuse[2], 0);
    }

    #[test]
    fn test_user_decoding_matches_kernel_layout() {
        let sim = Sim::direct();
        sim.kernel.fork().unwrap();
        let stat = sim.kernel.getpinfo();

        let decoded = UserProcStat::from_bytes(&stat.to_bytes()).unwrap();
        assert_eq!(decoded.inuse, stat.inuse);
        assert_eq!(decoded.tickets, stat.tickets);
        assert_eq!(decoded.pid, stat.pid);
        assert_eq!(decoded.ticks, stat.ticks);
        assert_eq!(UserProcStat::ENCODED_LEN, crate::process::ProcStat::ENCODED_LEN);
    }

    #[test]
    fn test_procdump_lists_live_processes() {
        let sim = Sim::direct();
        let child = sim.kernel.fork().unwrap();

        let lines = sim.kernel.procdump();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].pid, Pid(1));
        assert_eq!(lines[0].state, ProcState::Running);
        assert_eq!(lines[1].pid, child);
        assert_eq!(lines[1].state, ProcState::Runnable);
        assert!(lines.iter().all(|line| line.name == "initcode"));
    }

    // ========================================
    // Lottery on the simulated machine
    // ========================================

    #[test]
    fn test_lottery_shares_follow_tickets() {
        const ROUNDS: u64 = 12_000;
        const WEIGHTS: [i32; 3] = [10, 20, 30];

        let ticks = Sim::run(1, |os| {
            let pids: Vec<u64> = WEIGHTS
                .iter()
                .map(|&weight| {
                    let pid = os.spawn(move |os| {
                        os.settickets(weight).unwrap();
                        loop {
                            os.yield_now();
                        }
                    });
                    assert!(pid > 0);
                    pid as u64
                })
                .collect();

            let mut stat = UserProcStat::new();
            let ticks = loop {
                os.getpinfo(&mut stat).unwrap();
                let ticks: Vec<u64> = pids.iter().map(|&pid| ticks_of(&stat, pid)).collect();
                if ticks.iter().sum::<u64>() >= ROUNDS {
                    break ticks;
                }
                os.yield_now();
            };

            for &pid in &pids {
                os.kill(pid).unwrap();
            }
            for _ in &pids {
                os.wait().unwrap();
            }
            ticks
        });

        let total: u64 = ticks.iter().sum();
        let weight_sum: i32 = WEIGHTS.iter().sum();
        for (observed, weight) in ticks.iter().zip(WEIGHTS) {
            let share = *observed as f64 / total as f64;
            let expected = f64::from(weight) / f64::from(weight_sum);
            assert!(
                (share - expected).abs() < 0.03,
                "weight {} got share {:.3}, expected {:.3} ({:?})",
                weight,
                share,
                expected,
                ticks
            );
        }
    }

    #[test]
    fn test_many_processes_on_many_cpus() {
        const CHILDREN: usize = 12;

        let (reaped, used, first_inits, switches) = Sim::run(3, |os| {
            let mut pids: Vec<u64> = (0..CHILDREN)
                .map(|i| {
                    let pid = os.spawn(move |os| {
                        for _ in 0..(10 + i) {
                            os.yield_now();
                        }
                    });
                    assert!(pid > 0);
                    pid as u64
                })
                .collect();
            let mut reaped: Vec<u64> = (0..CHILDREN).map(|_| os.wait().unwrap()).collect();
            assert!(os.wait().is_err());

            pids.sort_unstable();
            reaped.sort_unstable();
            assert_eq!(pids, reaped);
            (
                reaped.len(),
                os.kernel().lock_table().used(),
                os.shared().first_inits(),
                os.kernel().context_switches(),
            )
        });

        assert_eq!(reaped, CHILDREN);
        assert_eq!(used, 1);
        assert_eq!(first_inits, 1);
        assert!(switches as usize > CHILDREN * 10);
    }

    #[test]
    fn test_timed_sleep() {
        let (start, end) = Sim::run(1, |os| {
            let start = os.uptime();
            os.sleep(5).unwrap();
            (start, os.uptime())
        });
        assert!(end - start >= 5, "slept {} ticks", end - start);
    }

    #[test]
    fn test_clock_advances_under_table_contention() {
        const SPINNERS: usize = 4;

        let (slept, reaped) = Sim::run(3, |os| {
            let pids: Vec<u64> = (0..SPINNERS)
                .map(|_| {
                    os.spawn(|os| loop {
                        os.yield_now();
                    }) as u64
                })
                .collect();

            let start = os.uptime();
            os.sleep(20).unwrap();
            let slept = os.uptime() - start;

            for &pid in &pids {
                os.kill(pid).unwrap();
            }
            let reaped = pids.iter().filter(|_| os.wait().is_ok()).count();
            (slept, reaped)
        });
        assert!(slept >= 20, "slept {} ticks", slept);
        assert_eq!(reaped, SPINNERS);
    }

    #[test]
    fn test_kill_interrupts_sleep() {
        let reaped = Sim::run(2, |os| {
            let child = os.spawn(|os| {
                let _ = os.sleep(1_000_000);
                panic!("sleep survived kill");
            });
            os.sleep(2).unwrap();
            os.kill(child as u64).unwrap();
            let reaped = os.wait().unwrap();
            assert_eq!(reaped as i64, child);
            reaped
        });
        assert!(reaped > 1);
    }
}
