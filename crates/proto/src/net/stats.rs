use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub datagrams_rejected: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub payloads_delivered: u64,
    pub duplicates_received: u64,
    pub packets_acked: u64,
    pub packets_timed_out: u64,
    pub packets_force_expired: u64,
}

impl NetworkStats {
    /// Share of resolved packets that expired without an ack, in percent.
    pub fn packet_loss_percent(&self) -> f32 {
        let lost = self.packets_timed_out + self.packets_force_expired;
        let resolved = self.packets_acked + lost;
        if resolved == 0 {
            return 0.0;
        }
        lost as f32 / resolved as f32 * 100.0
    }
}

/// Smoothed round-trip time, fed from acknowledged packets.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt_ms: f32,
    rtt_var_ms: f32,
    samples: u64,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    pub fn new() -> Self {
        Self {
            srtt_ms: 100.0,
            rtt_var_ms: 50.0,
            samples: 0,
        }
    }

    pub fn update(&mut self, sample: Duration) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let rtt = sample.as_secs_f32() * 1000.0;
        if self.samples == 0 {
            self.srtt_ms = rtt;
            self.rtt_var_ms = rtt / 2.0;
        } else {
            let diff = (rtt - self.srtt_ms).abs();
            self.rtt_var_ms = (1.0 - BETA) * self.rtt_var_ms + BETA * diff;
            self.srtt_ms = (1.0 - ALPHA) * self.srtt_ms + ALPHA * rtt;
        }
        self.samples += 1;
    }

    pub fn srtt_ms(&self) -> f32 {
        self.srtt_ms
    }

    pub fn rtt_var_ms(&self) -> f32 {
        self.rtt_var_ms
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}
