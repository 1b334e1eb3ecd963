use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_yellow};

/// Progress tracking for the three phases of a latest-build run
pub struct PhaseProgress {
    pb: ProgressBar,
}

impl PhaseProgress {
    pub fn start_phase_1() -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        let pb = create_spinner(
            bright_yellow("Phase 1/3: Listing build configurations").to_string(),
        );
        Self { pb }
    }

    pub fn finish_phase_1_start_phase_2(self, configurations: usize) -> Self {
        self.pb.finish_with_message(
            bright_green(format!("Phase 1/3: Found {configurations} build configurations ✓"))
                .to_string(),
        );
        let pb = create_spinner(bright_yellow("Phase 2/3: Resolving branches and builds").to_string());
        Self { pb }
    }

    pub fn finish_phase_2_start_phase_3(self, builds: usize) -> Self {
        self.pb.finish_with_message(
            bright_green(format!("Phase 2/3: Resolved {builds} latest builds ✓")).to_string(),
        );
        let pb = create_spinner(bright_yellow("Phase 3/3: Assembling report").to_string());
        Self { pb }
    }

    pub fn finish_phase_3(self) {
        self.pb
            .finish_with_message(bright_green("Phase 3/3: Report assembled ✓").to_string());
        eprintln!();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
