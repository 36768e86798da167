use rusqlite::TransactionBehavior;
use tracing::info;

use agora_types::models::Caller;

use crate::directory::{self, NewCategory};
use crate::{Database, StoreError};

struct SeedCategory {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    kind: &'static str,
    admin_only: bool,
    /// (thread name, initial message)
    threads: &'static [(&'static str, &'static str)],
}

const DEFAULT_CATEGORIES: &[SeedCategory] = &[
    SeedCategory {
        id: "announcements",
        name: "Announcements",
        description: "Official updates from the team",
        icon: "announcements",
        kind: "announcement",
        admin_only: true,
        threads: &[
            ("General Announcements", "Important updates and news"),
            ("Release Notes", "Latest features and improvements"),
        ],
    },
    SeedCategory {
        id: "show-your-work",
        name: "Show Your Work",
        description: "Share your renders and get feedback",
        icon: "gallery",
        kind: "showcase",
        admin_only: false,
        threads: &[
            ("Exterior", "Share and discuss exterior architectural renders"),
            ("Interior", "Share and discuss interior design renders"),
            ("Landscape", "Share and discuss landscape design renders"),
            ("Floorplan", "Share and discuss architectural floorplans"),
            ("Concept", "Share and discuss conceptual designs and ideas"),
        ],
    },
    SeedCategory {
        id: "tips-and-workflows",
        name: "Tips & Workflows",
        description: "Share prompts and techniques",
        icon: "tips",
        kind: "tips",
        admin_only: false,
        threads: &[
            ("Beginner Tips", "Getting started"),
            ("Advanced Techniques", "Pro tips and advanced workflows"),
            ("Prompts Library", "Share and discover effective prompts"),
        ],
    },
    SeedCategory {
        id: "ask-the-community",
        name: "Ask the Community",
        description: "Get help from fellow creators",
        icon: "ask-the-community",
        kind: "questions",
        admin_only: false,
        threads: &[
            ("General Help", "General questions"),
            ("Technical Support", "Technical issues and troubleshooting"),
            ("Integration Help", "Questions about integrating with other tools"),
            ("Best Practices", "Questions about workflow optimization"),
        ],
    },
    SeedCategory {
        id: "bug-reports",
        name: "Bug Reports",
        description: "Report technical issues",
        icon: "bug-droid",
        kind: "bugs",
        admin_only: false,
        threads: &[
            ("UI Issues", "Interface and visual bugs"),
            ("Performance Issues", "Slowdowns, crashes, and optimization problems"),
            ("Rendering Issues", "Problems with image generation and rendering"),
            ("Export/Import Issues", "Problems with file handling and data transfer"),
        ],
    },
    SeedCategory {
        id: "feature-requests",
        name: "Feature Requests",
        description: "Suggest new features",
        icon: "features",
        kind: "features",
        admin_only: false,
        threads: &[
            ("UI Improvements", "Suggestions for interface enhancements"),
            ("Workflow Features", "Ideas for improving the design process"),
            ("Integration Requests", "Suggestions for new tool integrations"),
            ("AI Capabilities", "Ideas for new AI-powered features"),
        ],
    },
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub categories: usize,
    pub threads: usize,
}

impl Database {
    /// Installs the default forum categories and their starter threads.
    /// Categories that already exist are left untouched, so re-running is a no-op.
    pub fn seed_categories(&self, caller: &Caller) -> Result<SeedReport, StoreError> {
        if !caller.is_admin() {
            return Err(StoreError::forbidden("Only admins can seed categories"));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut report = SeedReport::default();

            for seed in DEFAULT_CATEGORIES {
                let created = directory::insert_category(
                    &tx,
                    &NewCategory {
                        id: seed.id.to_string(),
                        name: seed.name.to_string(),
                        description: Some(seed.description.to_string()),
                        icon: Some(seed.icon.to_string()),
                        kind: Some(seed.kind.to_string()),
                        is_admin_only: seed.admin_only,
                    },
                )?;
                if !created {
                    continue;
                }
                report.categories += 1;

                for (name, body) in seed.threads {
                    directory::insert_thread(&tx, caller, seed.id, name, body, false)?;
                    report.threads += 1;
                }
            }

            tx.commit()?;
            info!(
                "Seeded {} categories and {} threads",
                report.categories, report.threads
            );
            Ok(report)
        })
    }
}
