//! Prometheus counters for the session core. Compiled to no-ops without the `prometheus` feature.

#[cfg(feature = "prometheus")]
mod imp {
    use lazy_static::*;
    use prometheus::{IntCounter, IntCounterVec, opts, register_int_counter, register_int_counter_vec};

    lazy_static! {
        static ref FTP_SESSIONS: IntCounter = register_int_counter!(opts!("ftp_sessions_total", "Total number of FTP sessions.")).unwrap();
        static ref FTP_BACKGROUND_COMMANDS: IntCounterVec = register_int_counter_vec!(
            "ftp_background_commands_total",
            "Total number of background commands by how they ended.",
            &["outcome"]
        )
        .unwrap();
        static ref FTP_PASSIVE_LISTENERS: IntCounterVec =
            register_int_counter_vec!("ftp_passive_listeners_total", "Total number of passive listener allocations.", &["result"]).unwrap();
    }

    pub fn inc_session() {
        FTP_SESSIONS.inc();
    }

    pub fn inc_background_command(outcome: &str) {
        FTP_BACKGROUND_COMMANDS.with_label_values(&[outcome]).inc();
    }

    pub fn inc_passive_listener(result: &str) {
        FTP_PASSIVE_LISTENERS.with_label_values(&[result]).inc();
    }
}

#[cfg(not(feature = "prometheus"))]
mod imp {
    pub fn inc_session() {}

    pub fn inc_background_command(_outcome: &str) {}

    pub fn inc_passive_listener(_result: &str) {}
}

pub(crate) use imp::{inc_background_command, inc_passive_listener, inc_session};
