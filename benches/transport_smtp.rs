use std::time::Duration;

use cellmail::{
    at::mock::MockModem, message, AtTimeouts, ModemMailer, PollTiming, RetryPolicy, SessionConfig,
    SmtpTimeouts,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.account = "user@example.com".to_owned();
    config.credential = "app-pass".to_owned();
    config.recipient = "dest@example.com".to_owned();
    config.recipient_name = "Dest".to_owned();
    config.subject = "Tank level".to_owned();
    config.set_body("Level is low.\n.\nRefill soon.\n".repeat(20));
    config
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("compose message", |b| {
        let config = config();
        b.iter(|| message::compose(black_box(&config)))
    });

    c.bench_function("send over mock modem", |b| {
        let modem = MockModem::new();
        let mut mailer = ModemMailer::builder(modem)
            .config(config())
            .retry_policy(RetryPolicy {
                attempts: 1,
                delay: Duration::ZERO,
            })
            .poll_timing(PollTiming {
                tick: Duration::from_micros(100),
                interval: Duration::from_millis(1),
                read_window: Duration::from_micros(500),
                settle: Duration::ZERO,
                open_settle: Duration::ZERO,
                max_chunk: 512,
            })
            .timeouts(AtTimeouts::uniform(Duration::from_millis(50)))
            .smtp_timeouts(SmtpTimeouts::uniform(Duration::from_millis(100)))
            .build();
        b.iter(|| {
            let result = mailer.try_send_email();
            assert!(result.is_ok());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
