#![allow(dead_code)]

pub mod test_runtime {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }
}

pub mod log_capture {
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;
    use tracing::subscriber::DefaultGuard;
    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log lines emitted on the current thread while the guard is alive.
    #[derive(Clone, Default)]
    pub struct LogCapture {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    pub struct CaptureWriter {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl io::Write for CaptureWriter {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.buf.lock().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            CaptureWriter {
                buf: Arc::clone(&self.buf),
            }
        }
    }

    impl LogCapture {
        pub fn install() -> (Self, DefaultGuard) {
            let capture = Self::default();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(capture.clone())
                .with_max_level(Level::DEBUG)
                .with_ansi(false)
                .finish();
            let guard = tracing::subscriber::set_default(subscriber);
            (capture, guard)
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.buf.lock()).into_owned()
        }

        pub fn contains(&self, needle: &str) -> bool {
            self.contents().contains(needle)
        }
    }
}
