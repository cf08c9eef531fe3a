mod queue_set;

use crate::config::KernelConfig;
use crate::kernel::Kernel;

/// Kernel with violation logging off, for tests that provoke violations.
fn quiet_kernel() -> Kernel {
    Kernel::new(KernelConfig::builder().assert_output(false).build())
}
