//! Few-shot design exemplars, picked by keywords in the requirement text.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exemplar {
    Counter,
    Fifo,
    Fsm,
}

const COUNTER: &str = r#"module up_counter #(
    parameter int WIDTH = 8
) (
    input  logic             clk,
    input  logic             rst_n,
    input  logic             en,
    output logic [WIDTH-1:0] value
);
    always_ff @(posedge clk or negedge rst_n) begin
        if (!rst_n)
            value <= '0;
        else if (en)
            value <= value + 1'b1;
    end
endmodule"#;

const FIFO: &str = r#"module sync_fifo #(
    parameter int DEPTH = 16,
    parameter int WIDTH = 8
) (
    input  logic             clk,
    input  logic             rst_n,
    input  logic             push,
    input  logic             pop,
    input  logic [WIDTH-1:0] din,
    output logic [WIDTH-1:0] dout,
    output logic             full,
    output logic             empty
);
    localparam int AW = $clog2(DEPTH);

    logic [WIDTH-1:0] mem [DEPTH];
    logic [AW:0] wptr, rptr;

    assign empty = (wptr == rptr);
    assign full  = (wptr[AW] != rptr[AW]) && (wptr[AW-1:0] == rptr[AW-1:0]);
    assign dout  = mem[rptr[AW-1:0]];

    always_ff @(posedge clk or negedge rst_n) begin
        if (!rst_n) begin
            wptr <= '0;
            rptr <= '0;
        end else begin
            if (push && !full)
                wptr <= wptr + 1'b1;
            if (pop && !empty)
                rptr <= rptr + 1'b1;
        end
    end

    always_ff @(posedge clk) begin
        if (push && !full)
            mem[wptr[AW-1:0]] <= din;
    end
endmodule"#;

const FSM: &str = r#"module handshake_fsm (
    input  logic clk,
    input  logic rst_n,
    input  logic req,
    input  logic ack,
    output logic busy,
    output logic done
);
    typedef enum logic [1:0] {IDLE, WAIT, FINISH} state_t;
    state_t state, next;

    always_ff @(posedge clk or negedge rst_n) begin
        if (!rst_n)
            state <= IDLE;
        else
            state <= next;
    end

    always_comb begin
        next = state;
        case (state)
            IDLE:    if (req) next = WAIT;
            WAIT:    if (ack) next = FINISH;
            FINISH:  next = IDLE;
            default: next = IDLE;
        endcase
    end

    assign busy = (state == WAIT);
    assign done = (state == FINISH);
endmodule"#;

impl Exemplar {
    /// Selection order.
    pub const ALL: [Self; 3] = [Self::Counter, Self::Fifo, Self::Fsm];

    /// Used when no keyword matches.
    pub const FALLBACK: Self = Self::Counter;

    /// Lowercase substrings that select this exemplar.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Counter => &["counter", "count"],
            Self::Fifo => &["fifo", "buffer", "queue"],
            Self::Fsm => &["fsm", "state", "machine"],
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Counter => "Parameterized counter",
            Self::Fifo => "Synchronous FIFO",
            Self::Fsm => "Finite state machine",
        }
    }

    pub fn source(self) -> &'static str {
        match self {
            Self::Counter => COUNTER,
            Self::Fifo => FIFO,
            Self::Fsm => FSM,
        }
    }

    /// Rendered block as it appears in a prompt.
    pub fn render(self) -> String {
        format!("### Example: {}\n```verilog\n{}\n```", self.title(), self.source())
    }

    /// Exemplars whose keywords occur in `requirement`, or the fallback.
    pub fn matching(requirement: &str) -> Vec<Self> {
        let lower = requirement.to_lowercase();
        let matched: Vec<Self> = Self::ALL
            .into_iter()
            .filter(|ex| ex.keywords().iter().any(|kw| lower.contains(kw)))
            .collect();
        if matched.is_empty() {
            vec![Self::FALLBACK]
        } else {
            matched
        }
    }

    /// Matching exemplars that fit in `budget` characters, in order.
    pub fn select(requirement: &str, budget: usize) -> Vec<Self> {
        let mut used = 0;
        Self::matching(requirement)
            .into_iter()
            .filter(|ex| {
                let len = ex.render().chars().count();
                if used + len <= budget {
                    used += len;
                    true
                } else {
                    false
                }
            })
            .collect()
    }
}

impl fmt::Display for Exemplar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Fifo => write!(f, "fifo"),
            Self::Fsm => write!(f, "fsm"),
        }
    }
}
