//! Comprehension checkpoint quiz and its EXP reward policy.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// One multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: usize,
    pub explanation: String,
}

impl QuizQuestion {
    fn new(prompt: &str, options: [&str; 4], correct_option: usize, explanation: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            options: options.iter().map(|option| option.to_string()).collect(),
            correct_option,
            explanation: explanation.to_string(),
        }
    }
}

/// Placeholder question set used until a question generator exists.
pub fn mock_questions() -> Vec<QuizQuestion> {
    vec![
        QuizQuestion::new(
            "What is the main theme discussed in the recent pages you've read?",
            [
                "The importance of daily routines",
                "The concept of mindfulness and presence",
                "The history of ancient philosophy",
                "The benefits of physical exercise",
            ],
            1,
            "The text emphasized mindfulness and being present in the current moment.",
        ),
        QuizQuestion::new(
            "Which philosopher was mentioned as an influence?",
            ["Aristotle", "Plato", "Marcus Aurelius", "Socrates"],
            2,
            "Marcus Aurelius was referenced in relation to Stoic philosophy.",
        ),
        QuizQuestion::new(
            "What was the key advice given about dealing with distractions?",
            [
                "Ignore them completely",
                "Schedule specific times for focused work",
                "Use technology to block distractions",
                "Work in complete isolation",
            ],
            1,
            "The text recommended scheduling specific blocks of time for deep, focused work.",
        ),
    ]
}

/// EXP awarded for `correct` right answers out of `total`.
///
/// 70% or better earns 25, 50% or better earns 10, anything else 5.
pub fn reward_for_score(correct: u32, total: u32) -> u64 {
    let scaled = u64::from(correct) * 100;
    let total = u64::from(total.max(1));
    if scaled >= 70 * total {
        25
    } else if scaled >= 50 * total {
        10
    } else {
        5
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizError {
    NoQuestions,
    /// Every question has been answered already.
    Finished,
    AlreadyAnswered,
    OptionOutOfRange { option: usize, options: usize },
    /// `finish` was called before the last question was answered.
    Incomplete { answered: usize, total: usize },
}

impl Display for QuizError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoQuestions => write!(f, "quiz has no questions"),
            Self::Finished => write!(f, "quiz is already complete"),
            Self::AlreadyAnswered => write!(f, "question was already answered"),
            Self::OptionOutOfRange { option, options } => {
                write!(f, "option {option} is outside 0..{options}")
            }
            Self::Incomplete { answered, total } => {
                write!(f, "answered {answered} of {total} questions")
            }
        }
    }
}

impl Error for QuizError {}

/// Feedback for one answered question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub correct: bool,
    pub correct_option: usize,
    pub explanation: String,
}

/// Final score and reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizResult {
    pub correct: u32,
    pub total: u32,
    /// Rounded percentage.
    pub percent: u32,
    pub reward: u64,
}

/// In-progress quiz: questions are answered in order, once each.
#[derive(Debug, Clone)]
pub struct CheckpointQuiz {
    questions: Vec<QuizQuestion>,
    index: usize,
    answered_current: bool,
    correct: u32,
}

impl Default for CheckpointQuiz {
    fn default() -> Self {
        Self::new(mock_questions())
    }
}

impl CheckpointQuiz {
    pub fn new(questions: Vec<QuizQuestion>) -> Self {
        Self {
            questions,
            index: 0,
            answered_current: false,
            correct: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    /// Zero-based index of the question being shown.
    pub fn position(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&QuizQuestion> {
        self.questions.get(self.index)
    }

    pub fn answer(&mut self, option: usize) -> Result<AnswerFeedback, QuizError> {
        if self.questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        let question = self.questions.get(self.index).ok_or(QuizError::Finished)?;
        if self.answered_current {
            return Err(QuizError::AlreadyAnswered);
        }
        if option >= question.options.len() {
            return Err(QuizError::OptionOutOfRange {
                option,
                options: question.options.len(),
            });
        }

        let correct = option == question.correct_option;
        let feedback = AnswerFeedback {
            correct,
            correct_option: question.correct_option,
            explanation: question.explanation.clone(),
        };
        self.answered_current = true;
        if correct {
            self.correct += 1;
        }
        Ok(feedback)
    }

    /// Moves past an answered question; returns whether another one follows.
    pub fn advance(&mut self) -> bool {
        if self.answered_current && self.index < self.questions.len() {
            self.index += 1;
            self.answered_current = false;
        }
        self.index < self.questions.len()
    }

    pub fn is_complete(&self) -> bool {
        !self.questions.is_empty()
            && (self.index >= self.questions.len()
                || (self.index + 1 == self.questions.len() && self.answered_current))
    }

    pub fn finish(&self) -> Result<QuizResult, QuizError> {
        if self.questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        if !self.is_complete() {
            return Err(QuizError::Incomplete {
                answered: self.index + usize::from(self.answered_current),
                total: self.questions.len(),
            });
        }
        let total = u32::try_from(self.questions.len()).unwrap_or(u32::MAX);
        let percent = ((f64::from(self.correct) / f64::from(total)) * 100.0).round() as u32;
        Ok(QuizResult {
            correct: self.correct,
            total,
            percent,
            reward: reward_for_score(self.correct, total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{reward_for_score, CheckpointQuiz, QuizError};

    #[test]
    fn reward_tiers_follow_score_thresholds() {
        assert_eq!(reward_for_score(3, 3), 25);
        assert_eq!(reward_for_score(7, 10), 25);
        assert_eq!(reward_for_score(2, 3), 10);
        assert_eq!(reward_for_score(1, 2), 10);
        assert_eq!(reward_for_score(1, 3), 5);
        assert_eq!(reward_for_score(0, 3), 5);
    }

    #[test]
    fn questions_are_answered_once_in_order() {
        let mut quiz = CheckpointQuiz::default();
        assert_eq!(quiz.total(), 3);

        let feedback = quiz.answer(1).expect("first answer");
        assert!(feedback.correct);
        assert_eq!(quiz.answer(0), Err(QuizError::AlreadyAnswered));
        assert!(quiz.advance());

        assert!(matches!(
            quiz.answer(9),
            Err(QuizError::OptionOutOfRange { option: 9, .. })
        ));
        assert!(!quiz.answer(0).expect("second answer").correct);
        assert!(matches!(quiz.finish(), Err(QuizError::Incomplete { answered: 2, total: 3 })));
        quiz.advance();

        quiz.answer(1).expect("third answer");
        assert!(quiz.is_complete());
        let result = quiz.finish().expect("result");
        assert_eq!((result.correct, result.total, result.percent), (2, 3, 67));
        assert_eq!(result.reward, 10);
        assert!(!quiz.advance());
        assert_eq!(quiz.answer(0), Err(QuizError::Finished));
    }

    #[test]
    fn advance_requires_an_answer() {
        let mut quiz = CheckpointQuiz::default();
        assert!(quiz.advance());
        assert_eq!(quiz.position(), 0);
    }

    #[test]
    fn empty_quiz_cannot_finish() {
        assert_eq!(
            CheckpointQuiz::new(Vec::new()).finish(),
            Err(QuizError::NoQuestions)
        );
    }
}
